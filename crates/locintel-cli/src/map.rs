use std::io::{self, Write};

use console::style;
use locintel::models::geo::{BoundingBox, FeatureCollection, Geometry};
use locintel::overlay::{MapSurface, Viewport};

/// How many places are listed by name before the rest are summarized
const LISTED_PLACES: usize = 8;

/// Draws the overlay as a text summary
pub struct TerminalMap<W: Write + Send> {
    out: W,
}

impl TerminalMap<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalMap<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_features(&mut self, features: &FeatureCollection) -> io::Result<()> {
        if features.is_empty() {
            return writeln!(self.out, "{}", style("Map cleared").dim());
        }

        writeln!(
            self.out,
            "{} {} on the map",
            style("◆").cyan(),
            style(plural(features.len(), "place")).bold()
        )?;
        for feature in features.features.iter().take(LISTED_PLACES) {
            let name = feature.properties.name.as_deref().unwrap_or("Unnamed place");
            let kind = match &feature.geometry {
                Geometry::Point(_) => "point",
                Geometry::Polygon(_) | Geometry::MultiPolygon(_) => "area",
            };
            match &feature.properties.category {
                Some(category) => writeln!(
                    self.out,
                    "  {} {} {}",
                    style("•").dim(),
                    name,
                    style(format!("({}, {})", category, kind)).dim()
                )?,
                None => writeln!(
                    self.out,
                    "  {} {} {}",
                    style("•").dim(),
                    name,
                    style(format!("({})", kind)).dim()
                )?,
            }
        }
        if features.len() > LISTED_PLACES {
            writeln!(
                self.out,
                "  {}",
                style(format!("and {} more", features.len() - LISTED_PLACES)).dim()
            )?;
        }
        Ok(())
    }

    fn write_viewport(&mut self, viewport: &Viewport) -> io::Result<()> {
        let [longitude, latitude] = viewport.center;
        writeln!(
            self.out,
            "{}",
            style(format!(
                "Centered on {:.4}, {:.4} at zoom {:.1}",
                latitude, longitude, viewport.zoom
            ))
            .dim()
        )
    }
}

impl<W: Write + Send> MapSurface for TerminalMap<W> {
    fn show(&mut self, features: &FeatureCollection) {
        if let Err(err) = self.write_features(features) {
            tracing::warn!(error = %err, "could not draw the map");
        }
    }

    fn fly_to(&mut self, viewport: &Viewport, _bounds: &BoundingBox) {
        if let Err(err) = self.write_viewport(viewport) {
            tracing::warn!(error = %err, "could not draw the map");
        }
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
