//! Fake transfer tools for tests: small shell scripts that understand the
//! subset of curl arguments the runner passes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

const PRELUDE: &str = r#"#!/bin/sh
src=""
diag=""
url=""
while [ $# -gt 0 ]; do
  case "$1" in
    -T) src="$2"; shift 2 ;;
    --stderr) diag="$2"; shift 2 ;;
    *) url="$1"; shift ;;
  esac
done
"#;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Behaviour of a fake tool.
pub enum ToolScript {
    /// Exits 0 without writing diagnostics.
    Succeed,
    /// Writes the message to the diagnostics file and exits 1.
    Fail(&'static str),
    /// Writes a few progress frames with pauses, then exits 0.
    Progress,
    /// Draws a progress bar, then a curl-style error, and exits 67.
    FailAfterProgress,
    /// Reports the source file's content as its percentage, then exits 0.
    EchoSource,
    /// Writes the target URL it was given to the diagnostics file and exits 1.
    ReportTarget,
    /// Never exits on its own.
    Hang,
}

impl ToolScript {
    fn body(&self) -> String {
        match self {
            Self::Succeed => "exit 0\n".into(),
            Self::Fail(msg) => format!("printf '%s' '{msg}' > \"$diag\"\nexit 1\n"),
            Self::Progress => concat!(
                "printf '##   10.0%%\\r' >> \"$diag\"\n",
                "sleep 0.2\n",
                "printf '#####   50.0%%\\r' >> \"$diag\"\n",
                "sleep 0.2\n",
                "printf '########## 100.0%%\\r\\n' >> \"$diag\"\n",
                "sleep 0.2\n",
                "exit 0\n",
            )
            .into(),
            Self::FailAfterProgress => concat!(
                "printf '##   10.0%%\\r' >> \"$diag\"\n",
                "printf 'curl: (67) Access denied: 530\\n' >> \"$diag\"\n",
                "exit 67\n",
            )
            .into(),
            Self::EchoSource => concat!(
                "printf '## %s.0%%' \"$(cat \"$src\")\" > \"$diag\"\n",
                "sleep 0.3\n",
                "exit 0\n",
            )
            .into(),
            Self::ReportTarget => "printf '%s' \"$url\" > \"$diag\"\nexit 1\n".into(),
            Self::Hang => "exec sleep 30\n".into(),
        }
    }
}

/// Writes an executable fake tool into `dir` and returns its path.
pub fn write_tool(dir: &Path, script: ToolScript) -> PathBuf {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("fake-tool-{id}"));
    std::fs::write(&path, format!("{PRELUDE}{}", script.body())).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    path
}
