//! Gzipped tar of the build context, as the daemon's build endpoint expects it

use crate::error::BuildError;
use crate::recipe::SourceSet;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::Path;
use tracing::debug;

/// Name under which the generated Dockerfile travels inside the archive
///
/// Kept distinct from `Dockerfile` so a file of that name in the context is
/// copied like any other source file.
pub const DOCKERFILE_NAME: &str = ".venvpack.Dockerfile";

const DOCKERIGNORE: &str = ".dockerignore";

/// Pack `source` plus the rendered `dockerfile` into a gzip tarball
///
/// The archived `.dockerignore` carries the context's own patterns plus the
/// generated Dockerfile, so `COPY . <workdir>` never lands it in the image.
/// The daemon still reads an ignored Dockerfile to drive the build.
pub fn context_archive(source: &SourceSet, dockerfile: &str) -> Result<Vec<u8>, BuildError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for relative in &source.files {
        if relative == Path::new(DOCKERIGNORE) {
            continue;
        }
        builder
            .append_path_with_name(source.root.join(relative), relative)
            .map_err(|e| copy_error(relative, e))?;
    }

    let ignore = ignore_file(source)?;
    append_generated(&mut builder, DOCKERIGNORE, ignore.as_bytes())?;
    append_generated(&mut builder, DOCKERFILE_NAME, dockerfile.as_bytes())?;

    let encoder = builder
        .into_inner()
        .map_err(|e| copy_error(&source.root, e))?;
    let bytes = encoder.finish().map_err(|e| copy_error(&source.root, e))?;

    debug!(
        "Packed {} context files into {} bytes",
        source.files.len(),
        bytes.len()
    );
    Ok(bytes)
}

fn ignore_file(source: &SourceSet) -> Result<String, BuildError> {
    let mut content = if source.dockerignore {
        let path = source.root.join(DOCKERIGNORE);
        std::fs::read_to_string(&path).map_err(|e| copy_error(&path, e))?
    } else {
        String::new()
    };
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(DOCKERFILE_NAME);
    content.push('\n');
    Ok(content)
}

fn append_generated<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
) -> Result<(), BuildError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| copy_error(Path::new(name), e))
}

fn copy_error(path: &Path, err: std::io::Error) -> BuildError {
    BuildError::SourceCopy {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
