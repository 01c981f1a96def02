// Embedded build context for the VPS base image.
// Compiled into the binary so the orchestrator can build the image on any host.

use crate::container::{BuildFile, ImageSpec};
use std::fs;
use std::path::Path;

pub const VPS_DOCKERFILE: &str = include_str!("resources/Dockerfile.vps");
pub const VPS_ENTRYPOINT: &str = include_str!("resources/vps-entrypoint.sh");

pub const DEFAULT_IMAGE_TAG: &str = "nxh-i7/ubuntu22.04-tmate";

/// Image spec for the shared VPS base image.
pub fn vps_base_image(tag: &str) -> ImageSpec {
    ImageSpec {
        tag: tag.to_string(),
        dockerfile: "Dockerfile.vps".to_string(),
        files: vec![
            BuildFile {
                path: "Dockerfile.vps".to_string(),
                contents: VPS_DOCKERFILE.to_string(),
                executable: false,
            },
            BuildFile {
                path: "vps-entrypoint.sh".to_string(),
                contents: VPS_ENTRYPOINT.to_string(),
                executable: true,
            },
        ],
    }
}

/// Write the files of a build context into `dir`.
pub fn write_build_context(spec: &ImageSpec, dir: &Path) -> std::io::Result<()> {
    for file in &spec.files {
        let path = dir.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &file.contents)?;

        #[cfg(unix)]
        if file.executable {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }
    }
    Ok(())
}
