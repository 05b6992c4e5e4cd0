mod system;

pub mod geocode;

pub use system::System;
