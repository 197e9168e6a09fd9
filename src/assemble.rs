//! Combining stage script fragments into one host script.
use crate::lighting::python_string;
use crate::render::RenderMode;
use crate::stages::{ArtifactKind, StageArtifact};
use std::path::Path;

/// Where and how the assembled script should render.
#[derive(Debug, Clone, Copy)]
pub struct RenderFooter<'a> {
    pub output_path: &'a Path,
    pub mode: RenderMode,
}

/// Orders script artifacts by stage then iteration and concatenates them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptAssembler;

impl ScriptAssembler {
    /// Non-script artifacts are ignored. The result is the same for any input
    /// order of `artifacts`.
    pub fn assemble(&self, artifacts: &[StageArtifact], footer: Option<&RenderFooter<'_>>) -> String {
        let mut scripts: Vec<&StageArtifact> = artifacts
            .iter()
            .filter(|artifact| artifact.kind == ArtifactKind::Script)
            .collect();
        scripts.sort_by_key(|artifact| (artifact.stage.order(), artifact.iteration));

        let mut out = String::from("# assembled scene script\nimport bpy\nimport math\n");
        for artifact in scripts {
            out.push_str(&format!(
                "\n# ---- {} (iteration {}) ----\n",
                artifact.stage, artifact.iteration
            ));
            out.push_str(artifact.content.trim_end());
            out.push('\n');
        }
        if let Some(footer) = footer {
            out.push_str(&render_footer(footer));
        }
        out
    }
}

fn render_footer(footer: &RenderFooter<'_>) -> String {
    let output = python_string(&footer.output_path.to_string_lossy());
    format!(
        "\n# ---- render ({mode}) ----\n\
         scene = bpy.context.scene\n\
         scene.render.engine = \"CYCLES\"\n\
         scene.cycles.samples = {samples}\n\
         scene.render.resolution_x = 1920\n\
         scene.render.resolution_y = 1080\n\
         scene.render.resolution_percentage = {percentage}\n\
         scene.render.image_settings.file_format = \"PNG\"\n\
         scene.render.filepath = {output}\n\
         if scene.camera is not None:\n    \
             bpy.ops.render.render(write_still=True)\n\
         else:\n    \
             print(\"sforge: no camera in scene, skipping render\")\n",
        mode = footer.mode,
        samples = footer.mode.samples(),
        percentage = footer.mode.resolution_percentage(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageId;

    fn script(stage: StageId, iteration: u32, body: &str) -> StageArtifact {
        StageArtifact::new(stage, iteration, body.to_string(), 1_000)
    }

    #[test]
    fn orders_by_stage_then_iteration() {
        let artifacts = vec![
            script(StageId::RenderSetup, 1, "camera()"),
            script(StageId::Geometry, 2, "geometry_v2()"),
            StageArtifact::new(StageId::Concept, 1, r#"{"description":"x"}"#.to_string(), 1_000),
            script(StageId::Lighting, 1, "lights()"),
            script(StageId::Geometry, 1, "geometry_v1()"),
        ];
        let out = ScriptAssembler.assemble(&artifacts, None);
        let positions: Vec<usize> = ["geometry_v1()", "geometry_v2()", "lights()", "camera()"]
            .iter()
            .map(|needle| out.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(!out.contains("description"));
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = script(StageId::Materials, 1, "materials()");
        let b = script(StageId::Geometry, 1, "geometry()");
        let forward = ScriptAssembler.assemble(&[a.clone(), b.clone()], None);
        let backward = ScriptAssembler.assemble(&[b, a], None);
        assert_eq!(forward, backward);
    }

    #[test]
    fn footer_carries_output_and_mode() {
        let footer = RenderFooter {
            output_path: Path::new("/w/iterations/001/render.png"),
            mode: RenderMode::Final,
        };
        let out = ScriptAssembler.assemble(&[script(StageId::Geometry, 1, "g()")], Some(&footer));
        assert!(out.contains("scene.render.filepath = \"/w/iterations/001/render.png\""));
        assert!(out.contains("scene.cycles.samples = 256"));
        assert!(out.contains("# ---- render (final) ----"));
        assert!(out.contains("    bpy.ops.render.render(write_still=True)"));
    }
}
