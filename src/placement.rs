//! Maps detections in image space onto building elements in model space.
//!
//! Pixel coordinates are scaled to meters and the image Y axis is flipped so
//! that "down" in the drawing becomes negative Y in the model. Every detection
//! is replicated once per floor.

use crate::collaborators::{Detection, Element, ElementKind};
use crate::params::PipelineParams;

/// Fixed slab thickness in meters, independent of floor height.
const SLAB_THICKNESS: f64 = 0.2;

/// Element kind, display name, height fraction and sill fraction for a class.
struct Profile {
    kind: ElementKind,
    name: String,
    height: Extent,
    sill_fraction: f64,
}

enum Extent {
    Fraction(f64),
    Meters(f64),
}

fn profile_for(class: &str) -> Profile {
    let class = class.trim().to_lowercase();
    let profile = |kind, name: String, height, sill_fraction| Profile {
        kind,
        name,
        height,
        sill_fraction,
    };
    match class.as_str() {
        "column" | "person" => profile(ElementKind::Column, "Column".into(), Extent::Fraction(1.0), 0.0),
        "door" | "double-door" | "sliding door" | "garage door" => {
            profile(ElementKind::Door, title_case(&class), Extent::Fraction(0.8), 0.0)
        }
        "window" | "ventilator" => {
            profile(ElementKind::Window, title_case(&class), Extent::Fraction(0.4), 0.3)
        }
        "staircase" | "stairs" => {
            profile(ElementKind::Stair, "Staircase".into(), Extent::Fraction(0.5), 0.0)
        }
        "slab" => profile(ElementKind::Slab, "Slab".into(), Extent::Meters(SLAB_THICKNESS), 0.0),
        _ => profile(ElementKind::Proxy, title_case(&class), Extent::Fraction(0.5), 0.0),
    }
}

// Capitalises the first letter of every whitespace- or hyphen-separated word.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

/// Converts detections into the element list handed to the model generator.
///
/// Detections whose scaled footprint has a negative width or depth are skipped.
pub fn place_elements(detections: &[Detection], params: &PipelineParams) -> Vec<Element> {
    let scale = params.scale;
    let floor_height = params.height;
    let mut elements = Vec::new();

    for det in detections {
        let [x1, y1, x2, y2] = det.bbox.map(|v| v * scale);
        let width = x2 - x1;
        let depth = y2 - y1;
        if width < 0.0 || depth < 0.0 {
            tracing::warn!(class = %det.class, ?det.bbox, "skipping detection with inverted bbox");
            continue;
        }
        let center = (x1 + width / 2.0, -(y1 + depth / 2.0));
        let profile = profile_for(&det.class);
        let height = match profile.height {
            Extent::Fraction(f) => floor_height * f,
            Extent::Meters(m) => m,
        };

        for floor in 0..params.floor_count {
            let base = f64::from(floor) * floor_height;
            elements.push(Element {
                kind: profile.kind,
                name: profile.name.clone(),
                center,
                width,
                depth,
                height,
                elevation: base + floor_height * profile.sill_fraction,
            });
        }
    }

    elements
}
