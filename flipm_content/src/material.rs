use flipm_shared::log::{debug, trace};

use crate::{
    config::{ConfigNode, DEFINE_SEPARATOR},
    scene_lights::LightSummary,
};

/// Property of a pass that holds the shader defines.
pub const DEFINES_KEY: &str = "defines";

/// Returns `true` for headers of the form `material <name>:<parent>`. These are the
/// materials the encoder generates for the nodes of a scene.
pub fn is_derived_material_header(header: &str) -> bool {
    let Some(rest) = header.strip_prefix("material ") else {
        return false;
    };
    rest.char_indices()
        .any(|(index, c)| c == ':' && index > 0 && index + c.len_utf8() < rest.len())
}

/// Appends `defines` to the `defines` property of every `pass` in every `technique`
/// of every derived material. Returns the number of passes that were changed.
pub fn inject_defines(root: &mut ConfigNode, defines: &str) -> usize {
    let mut passes = 0;
    for material in root.children_where(is_derived_material_header) {
        trace!("Injecting defines into '{}'", material.header);
        for technique in material.children_where(|header| header.starts_with("technique")) {
            for pass in technique.children_where(|header| header.starts_with("pass")) {
                pass.append_property(DEFINES_KEY, defines);
                passes += 1;
            }
        }
    }
    passes
}

/// Rewrites absolute paths to resource relative ones and adds the light defines to the passes.
pub fn fix_material(root: &mut ConfigNode, resource_parent_prefix: Option<&str>, lights: &LightSummary) {
    if let Some(prefix) = resource_parent_prefix {
        root.strip_prefix(prefix);
    }
    let defines = lights.defines().join(DEFINE_SEPARATOR);
    debug!("Light defines for the material: '{defines}'");
    if !defines.is_empty() {
        let passes = inject_defines(root, &defines);
        debug!("Added light defines to {passes} passes");
    }
}

#[cfg(test)]
mod tests {
    use flipm_shared::indoc::indoc;

    use crate::config;

    use super::*;

    const MATERIAL: &str = indoc! {"
        material colored
        {
            technique
            {
                pass
                {
                    vertexShader = /work/res/shaders/colored.vert
                    defines = SKINNING
                }
            }
        }

        material Board:colored
        {
            u_diffuseColor = 1, 0, 0, 1

            technique
            {
                pass 0
                {
                    defines = MODULATE_ALPHA
                }

                pass 1
                {
                }

                renderState
                {
                }
            }
        }

        material Lamp : colored
        {
            technique
            {
                pass
                {
                    sampler u_diffuseTexture
                    {
                        path = /work/res/textures/lamp.png
                    }
                }
            }
        }
    "};

    #[test]
    fn derived_material_headers() {
        assert!(is_derived_material_header("material Board:colored"));
        assert!(is_derived_material_header("material Lamp : colored"));
        assert!(!is_derived_material_header("material colored"));
        assert!(!is_derived_material_header("material :colored"));
        assert!(!is_derived_material_header("material Board:"));
        assert!(!is_derived_material_header("technique a:b"));
    }

    #[test]
    fn defines_only_in_derived_materials() {
        let mut root = config::parse(MATERIAL).unwrap();
        let lights = LightSummary {
            directional: 1,
            point: 2,
            spot: 0,
        };
        fix_material(&mut root, Some("/work/"), &lights);

        let base_pass = &root.children[0].children[0].children[0];
        assert_eq!(base_pass.property("defines"), Some("SKINNING"));
        assert_eq!(base_pass.property("vertexShader"), Some("res/shaders/colored.vert"));

        let board = &root.children[1].children[0];
        assert_eq!(
            board.children[0].property("defines"),
            Some("MODULATE_ALPHA; DIRECTIONAL_LIGHT_COUNT 1; POINT_LIGHT_COUNT 2")
        );
        assert_eq!(board.children[1].property("defines"), Some("DIRECTIONAL_LIGHT_COUNT 1; POINT_LIGHT_COUNT 2"));
        assert_eq!(board.children[2].property("defines"), None);

        let lamp_pass = &root.children[2].children[0].children[0];
        assert_eq!(lamp_pass.property("defines"), Some("DIRECTIONAL_LIGHT_COUNT 1; POINT_LIGHT_COUNT 2"));
        assert_eq!(lamp_pass.children[0].property("path"), Some("res/textures/lamp.png"));
    }

    #[test]
    fn no_lights_only_strips_paths() {
        let mut root = config::parse(MATERIAL).unwrap();
        let before = root.clone();
        fix_material(&mut root, Some("/nowhere/"), &LightSummary::default());
        assert_eq!(root, before);
        assert!(!root.serialize().contains("LIGHT_COUNT"));
    }

    #[test]
    fn without_prefix_paths_stay_absolute() {
        let mut root = config::parse(MATERIAL).unwrap();
        fix_material(&mut root, None, &LightSummary::default());
        let base_pass = &root.children[0].children[0].children[0];
        assert_eq!(base_pass.property("vertexShader"), Some("/work/res/shaders/colored.vert"));
    }

    #[test]
    fn inject_counts_passes() {
        let mut root = config::parse(MATERIAL).unwrap();
        assert_eq!(inject_defines(&mut root, "SPOT_LIGHT_COUNT 1"), 3);
    }
}
