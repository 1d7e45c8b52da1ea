//! Shared test infrastructure for integration tests.
//!
//! The fixture stands up shell-script stand-ins for `kubectl` and the auditor
//! so the binary can be driven end to end without a cluster or container
//! runtime.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FAKE_KUBECTL: &str = r#"#!/bin/sh
# get pods --namespace NS ...   |   get pod NAME --namespace NS ...   |   config current-context
if [ "$1" = "config" ]; then
  echo "kind-fake"
  exit 0
fi
if [ "$1" = "get" ] && [ "$2" = "pods" ]; then
  case "$4" in
    shop)
      cat <<'EOF'
{
  "apiVersion": "v1",
  "kind": "List",
  "items": [
    {"metadata": {"name": "web-2", "namespace": "shop"}},
    {"metadata": {"name": "web-0", "namespace": "shop"}},
    {"metadata": {"name": "web-1", "namespace": "shop"}}
  ]
}
EOF
      exit 0 ;;
    idle)
      echo '{"apiVersion": "v1", "kind": "List", "items": []}'
      exit 0 ;;
    *)
      echo "Error from server (Forbidden): namespaces \"$4\" is forbidden" >&2
      exit 1 ;;
  esac
fi
if [ "$1" = "get" ] && [ "$2" = "pod" ]; then
  printf 'apiVersion: v1\nkind: Pod\nmetadata:\n  name: %s\n  namespace: %s\n' "$3" "$5"
  exit 0
fi
echo "unexpected kubectl invocation: $*" >&2
exit 64
"#;

const FAKE_AUDITOR: &str = r#"#!/bin/sh
# -f MANIFEST; emits pretty-printed SARIF on stdout and chatter on stderr.
manifest="$2"
[ -f "$manifest" ] || { echo "missing manifest $manifest" >&2; exit 3; }
echo "time=now level=info msg=auditing" >&2
case "$manifest" in
  web-0.yaml)
    level="" ;;
  web-1.yaml)
    level="warning"; rule="AppArmorAnnotationMissing"; auditor="apparmor" ;;
  web-2.yaml)
    level="error"; rule="PrivilegedTrue"; auditor="privileged" ;;
esac
if [ -z "$level" ]; then
  printf '{\n  "version": "2.1.0",\n  "runs": [\n    {\n      "results": []\n    }\n  ]\n}\n'
  exit 0
fi
cat <<EOF
{
  "version": "2.1.0",
  "runs": [
    {
      "results": [
        {
          "ruleId": "$rule",
          "level": "$level",
          "message": {
            "text": "Details: $rule found\nAuditor: $auditor\nDescription: flagged by $auditor\nAuditor docs: https://example.com/$auditor"
          },
          "locations": [
            {"physicalLocation": {"artifactLocation": {"uri": "$manifest"}}}
          ]
        }
      ]
    }
  ]
}
EOF
[ "$level" = "error" ] && exit 2
exit 0
"#;

/// Temp workspace holding fake collaborators and report output.
pub struct SweepFixture {
    pub temp: TempDir,
    pub kubectl: PathBuf,
    pub auditor: PathBuf,
}

impl SweepFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create fixture dir");
        let kubectl = write_executable(temp.path(), "kubectl", FAKE_KUBECTL);
        let auditor = write_executable(temp.path(), "kubeaudit", FAKE_AUDITOR);
        Self {
            temp,
            kubectl,
            auditor,
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        self.temp.path().join("reports")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.temp.path().join("scratch")
    }

    /// Run `ksweep run` against the fakes with extra arguments.
    pub fn run(&self, extra: &[&str]) -> Output {
        let auditor_command = format!("{} -f {{manifest}}", self.auditor.display());
        Command::new(env!("CARGO_BIN_EXE_ksweep"))
            .arg("run")
            .arg("--kubectl")
            .arg(&self.kubectl)
            .arg("--auditor-command")
            .arg(auditor_command)
            .arg("--scratch-dir")
            .arg(self.scratch_dir())
            .args(extra)
            .env("RUST_LOG", "debug")
            .env("XDG_CONFIG_HOME", self.temp.path().join("xdg"))
            .current_dir(self.temp.path())
            .output()
            .expect("run ksweep")
    }
}

fn write_executable(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    let mut permissions = std::fs::metadata(&path).expect("stat script").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("chmod script");
    path
}
