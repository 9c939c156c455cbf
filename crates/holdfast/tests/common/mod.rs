use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestState {
    pub root: TempDir,
    key: String,
}

impl TestState {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let key = BASE64.encode([42u8; 32]);
        Self { root, key }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn write_payload(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// A holdfast invocation wired to this state directory
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("holdfast").unwrap();
        cmd.env("HOLDFAST_STATE_DIR", self.root.path().join("state-root"))
            .env("HOLDFAST_KEY", &self.key);
        cmd
    }
}
