//! These models represent the objects passed between the stream, the reducer and the map
//!
//! There are several different related formats we need to interact with:
//! - stream events, produced by the chat-completion collaborator (the agent)
//! - conversation turns and parts, the folded view of those events
//! - openai messages/tools, sent from the agent to the LLM
//! - geojson feature collections, exchanged with the geocoder and the map overlay
//!
//! We always immediately convert wire formats into the internal structs using to/from
//! helpers, so the rest of the crate only ever sees these types.
pub mod event;
pub mod geo;
pub mod message;
pub mod role;
pub mod tool;
