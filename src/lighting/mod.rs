//! Lighting asset selection and blending.
//!
//! Selection scores every catalog asset against a [`SceneContext`]; blending
//! turns the winners into layered world lighting and a render-host script.
//!
//! [`SceneContext`]: crate::scene::SceneContext
mod blend;
mod script;
mod select;
pub mod tags;

pub use blend::{create_blend_configuration, BlendConfiguration, BlendMode, Tint};
pub use script::{default_lighting_script, generate_blend_script, python_string};
pub use select::select_smart;

#[cfg(test)]
pub use script::MIX_NODE;

const WARM_TINT: Tint = [1.0, 0.86, 0.72];
const COOL_TINT: Tint = [0.74, 0.84, 1.0];

/// Colour tint implied by a time-of-day label, if any.
pub fn tint_for_time(time_of_day: Option<&str>) -> Option<Tint> {
    match time_of_day? {
        "sunset" | "golden_hour" => Some(WARM_TINT),
        "night" | "blue_hour" => Some(COOL_TINT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tints_by_time_of_day() {
        assert_eq!(tint_for_time(Some("golden_hour")), Some(WARM_TINT));
        assert_eq!(tint_for_time(Some("night")), Some(COOL_TINT));
        assert_eq!(tint_for_time(Some("noon")), None);
        assert_eq!(tint_for_time(None), None);
    }
}
