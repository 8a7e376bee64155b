//! Fixtures for command tests: archives, a local release host and a
//! matching `skiapkg.toml`.

use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use httpmock::MockServer;

use crate::context::Context;
use crate::output::{Output, Verbosity};

pub const TAG: &str = "skia-m144";

/// One platform assembled from two archives.
pub const DUO_TARGET: &str = r#"
[[targets]]
platform = "duo"
package = "@test/duo"
os = ["linux"]
cpu = ["x64"]

[[targets.artifacts]]
name = "skia-one"
dest = "one"

[[targets.artifacts]]
name = "skia-two"
dest = "two"
"#;

/// Two platforms with one archive each.
pub const ALPHA_BETA_TARGETS: &str = r#"
[[targets]]
platform = "alpha"
package = "@test/alpha"

[[targets.artifacts]]
name = "skia-alpha"
dest = "x64"

[[targets]]
platform = "beta"
package = "@test/beta"

[[targets.artifacts]]
name = "skia-beta"
dest = "x64"
"#;

pub fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn asset_path(artifact: &str) -> String {
    format!("/releases/{}/{}-{}.tar.gz", TAG, artifact, TAG)
}

/// Write a config pointing at `server` and load it.
pub fn context(dir: &Path, server: &MockServer, targets: &str) -> Context {
    let path = dir.join("skiapkg.toml");
    let content = format!(
        "[release]\nmilestone = \"m144\"\nbase_url = \"{}\"\n\n[http]\nmax_retries = 0\nretry_delay_ms = 1\n{}",
        server.url("/releases/"),
        targets
    );
    std::fs::write(&path, content).unwrap();
    Context::load(Some(&path), None).unwrap()
}

pub fn quiet() -> Output {
    Output::new(Verbosity::Quiet)
}
