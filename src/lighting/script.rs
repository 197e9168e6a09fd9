//! Render-host script generation for world lighting.
//!
//! Output targets Blender's Python API: environment textures sampled through
//! a mapping node, folded together by binary mix nodes, then scaled by the
//! world background strength.
use super::blend::{BlendConfiguration, BlendLayer};

/// Shader node used for every binary combine step.
pub const MIX_NODE: &str = "ShaderNodeMixRGB";

/// Sun elevation (degrees), sun energy, and sun colour for a time-of-day label.
struct SunPreset {
    elevation_deg: f64,
    energy: f64,
    color: [f64; 3],
}

fn sun_preset(time_of_day: Option<&str>) -> SunPreset {
    match time_of_day {
        Some("sunrise") => SunPreset {
            elevation_deg: 6.0,
            energy: 2.5,
            color: [1.0, 0.78, 0.6],
        },
        Some("sunset") | Some("golden_hour") => SunPreset {
            elevation_deg: 4.0,
            energy: 2.5,
            color: [1.0, 0.62, 0.38],
        },
        Some("evening") => SunPreset {
            elevation_deg: 10.0,
            energy: 2.0,
            color: [1.0, 0.75, 0.55],
        },
        Some("blue_hour") => SunPreset {
            elevation_deg: -3.0,
            energy: 0.4,
            color: [0.55, 0.65, 1.0],
        },
        Some("night") => SunPreset {
            elevation_deg: 35.0,
            energy: 0.08,
            color: [0.6, 0.7, 1.0],
        },
        Some("morning") => SunPreset {
            elevation_deg: 25.0,
            energy: 3.5,
            color: [1.0, 0.95, 0.88],
        },
        _ => SunPreset {
            elevation_deg: 55.0,
            energy: 4.0,
            color: [1.0, 0.98, 0.95],
        },
    }
}

/// Script that builds the world node tree for `config`.
///
/// A zero-layer configuration falls back to [`default_lighting_script`]; a
/// single layer is wired straight to the background with no mix node.
pub fn generate_blend_script(config: &BlendConfiguration, world_strength: f64) -> String {
    if config.is_empty() {
        return default_lighting_script(None, world_strength);
    }

    let mut script = String::new();
    script.push_str(&format!(
        "# world lighting: {} blend, {} layer(s)\n",
        config.mode,
        config.layers.len()
    ));
    script.push_str(WORLD_PREAMBLE);
    script.push_str("coord = nodes.new(\"ShaderNodeTexCoord\")\n");

    let mut total = 0.0;
    for (index, layer) in config.layers.iter().enumerate() {
        script.push_str(&layer_block(index, layer));
        total += layer.strength;
        if index == 0 {
            script.push_str("acc = layer_0\n");
            continue;
        }
        // Running weighted average: the new layer's share of everything so far.
        let fac = if total > 0.0 { layer.strength / total } else { 0.0 };
        script.push_str(&format!(
            "mix_{index} = nodes.new(\"{MIX_NODE}\")\n\
             mix_{index}.blend_type = \"MIX\"\n\
             mix_{index}.inputs[\"Fac\"].default_value = {fac:.6}\n\
             links.new(acc, mix_{index}.inputs[1])\n\
             links.new(layer_{index}, mix_{index}.inputs[2])\n\
             acc = mix_{index}.outputs[\"Color\"]\n"
        ));
    }

    script.push_str(&format!(
        "background = nodes.new(\"ShaderNodeBackground\")\n\
         background.inputs[\"Strength\"].default_value = {world_strength:.6}\n\
         links.new(acc, background.inputs[\"Color\"])\n\
         links.new(background.outputs[\"Background\"], output.inputs[\"Surface\"])\n"
    ));
    script
}

/// Sun plus procedural sky, keyed on time of day. Used when no asset matched.
pub fn default_lighting_script(time_of_day: Option<&str>, world_strength: f64) -> String {
    let preset = sun_preset(time_of_day);
    let [r, g, b] = preset.color;
    let mut script = String::new();
    script.push_str(&format!(
        "# world lighting: default sun and sky ({})\n",
        time_of_day.unwrap_or("day")
    ));
    script.push_str(WORLD_PREAMBLE);
    script.push_str(&format!(
        "sky = nodes.new(\"ShaderNodeTexSky\")\n\
         sky.sun_elevation = math.radians({elevation:.3})\n\
         background = nodes.new(\"ShaderNodeBackground\")\n\
         background.inputs[\"Strength\"].default_value = {world_strength:.6}\n\
         links.new(sky.outputs[\"Color\"], background.inputs[\"Color\"])\n\
         links.new(background.outputs[\"Background\"], output.inputs[\"Surface\"])\n\
         sun_data = bpy.data.lights.new(name=\"sforge_sun\", type=\"SUN\")\n\
         sun_data.energy = {energy:.3}\n\
         sun_data.color = ({r:.3}, {g:.3}, {b:.3})\n\
         sun = bpy.data.objects.new(name=\"sforge_sun\", object_data=sun_data)\n\
         sun.rotation_euler = (math.radians({tilt:.3}), 0.0, math.radians(35.0))\n\
         bpy.context.scene.collection.objects.link(sun)\n",
        elevation = preset.elevation_deg,
        energy = preset.energy,
        tilt = 90.0 - preset.elevation_deg,
    ));
    script
}

const WORLD_PREAMBLE: &str = "import bpy\n\
import math\n\
world = bpy.context.scene.world or bpy.data.worlds.new(\"sforge_world\")\n\
bpy.context.scene.world = world\n\
world.use_nodes = True\n\
nodes = world.node_tree.nodes\n\
links = world.node_tree.links\n\
nodes.clear()\n\
output = nodes.new(\"ShaderNodeOutputWorld\")\n";

fn layer_block(index: usize, layer: &BlendLayer) -> String {
    let path = python_string(&layer.file.to_string_lossy());
    let mut block = format!(
        "# layer {index}: {name} (strength {strength:.4})\n\
         mapping_{index} = nodes.new(\"ShaderNodeMapping\")\n\
         mapping_{index}.inputs[\"Rotation\"].default_value[2] = {rotation:.6}\n\
         links.new(coord.outputs[\"Generated\"], mapping_{index}.inputs[\"Vector\"])\n\
         env_{index} = nodes.new(\"ShaderNodeTexEnvironment\")\n\
         env_{index}.image = bpy.data.images.load({path}, check_existing=True)\n\
         links.new(mapping_{index}.outputs[\"Vector\"], env_{index}.inputs[\"Vector\"])\n\
         layer_{index} = env_{index}.outputs[\"Color\"]\n",
        name = layer.asset.replace('\n', " "),
        strength = layer.strength,
        rotation = layer.rotation,
    );
    if let Some([r, g, b]) = layer.tint {
        block.push_str(&format!(
            "tint_{index} = nodes.new(\"ShaderNodeVectorMath\")\n\
             tint_{index}.operation = \"MULTIPLY\"\n\
             tint_{index}.inputs[1].default_value = ({r:.3}, {g:.3}, {b:.3})\n\
             links.new(layer_{index}, tint_{index}.inputs[0])\n\
             layer_{index} = tint_{index}.outputs[\"Vector\"]\n"
        ));
    }
    block
}

/// Double-quoted Python string literal.
pub fn python_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
