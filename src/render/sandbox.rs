//! Sandboxed execution of untrusted generated renderer code.
//!
//! Generated Python source is never trusted: it is scanned against a
//! deny-list and an import allow-list before anything touches the
//! filesystem, wrapped in non-negotiable boilerplate (headless render mode,
//! canvas and DPI floors, a controlled output path), and run in an isolated
//! child process with a scrubbed environment and a wall-clock timeout.
//!
//! The binding security boundary is process isolation, the allow-list and
//! the timeout; source rewriting is defense-in-depth only. Temporary
//! artifacts live in a `TempDir` so they are removed on every exit path,
//! including timeout: the child is spawned with `kill_on_drop`, and dropping
//! the timed-out future kills it before the directory is torn down.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::render::BackendKind;

/// Deny-list of syntax patterns that have no business in renderer code:
/// process control, filesystem access, networking, reflection and
/// dynamic evaluation.
const DENIED_PATTERNS: &[(&str, &str)] = &[
    (r"\bsubprocess\b", "subprocess"),
    (r"\bos\s*\.\s*(system|popen|exec\w*|spawn\w*|fork|kill|remove|unlink|rmdir|rename)", "os process/file call"),
    (r"\beval\s*\(", "eval("),
    (r"\bexec\s*\(", "exec("),
    (r"__import__", "__import__"),
    (r"\bimportlib\b", "importlib"),
    (r"\bopen\s*\(", "open("),
    (r"\bsocket\b", "socket"),
    (r"\bshutil\b", "shutil"),
    (r"\bpathlib\b", "pathlib"),
    (r"\bgetattr\s*\(", "getattr("),
    (r"\bsetattr\s*\(", "setattr("),
    (r"\bglobals\s*\(", "globals("),
    (r"\bcompile\s*\(", "compile("),
    (r"\binput\s*\(", "input("),
    (r"\bbreakpoint\s*\(", "breakpoint("),
];

/// Renderer runtime executed inside the sandbox. Selects the import
/// allow-list and the injected boilerplate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxRuntime {
    /// matplotlib pyplot scripts (function plots, waveforms, charts).
    Matplotlib,
    /// schemdraw circuit schematics (drawn on top of matplotlib).
    Schemdraw,
    /// graphviz graph layouts (trees, automata, block diagrams).
    Graphviz,
}

impl SandboxRuntime {
    /// Maps a render backend to its sandbox runtime. Markup and generative
    /// backends never reach the sandbox.
    pub fn for_backend(kind: BackendKind) -> Option<SandboxRuntime> {
        match kind {
            BackendKind::ProceduralPlot => Some(SandboxRuntime::Matplotlib),
            BackendKind::CircuitSchematic => Some(SandboxRuntime::Schemdraw),
            BackendKind::GraphLayout => Some(SandboxRuntime::Graphviz),
            BackendKind::MarkupRaster | BackendKind::GenerativeImage => None,
        }
    }

    /// Root modules the generated source is allowed to import.
    pub fn allowed_imports(&self) -> &'static [&'static str] {
        match self {
            SandboxRuntime::Matplotlib => {
                &["matplotlib", "mpl_toolkits", "numpy", "math", "itertools"]
            }
            SandboxRuntime::Schemdraw => &["schemdraw", "matplotlib", "numpy", "math"],
            SandboxRuntime::Graphviz => &["graphviz", "math"],
        }
    }

    /// Runtime name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SandboxRuntime::Matplotlib => "matplotlib",
            SandboxRuntime::Schemdraw => "schemdraw",
            SandboxRuntime::Graphviz => "graphviz",
        }
    }
}

impl std::fmt::Display for SandboxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter binary used to run generated source.
    pub python_bin: String,
    /// Wall-clock limit for a single execution.
    pub timeout: Duration,
    /// Minimum canvas edge in inches, enforced after user code runs.
    pub min_canvas_inches: f64,
    /// Minimum output DPI, enforced at save time.
    pub dpi_floor: u32,
    /// Root directory for per-execution temp dirs; `None` uses the system
    /// temp dir. Tests point this at a scannable location.
    pub work_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            timeout: Duration::from_secs(20),
            min_canvas_inches: 6.0,
            dpi_floor: 150,
            work_root: None,
        }
    }
}

impl SandboxConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interpreter binary.
    pub fn with_python_bin(mut self, bin: impl Into<String>) -> Self {
        self.python_bin = bin.into();
        self
    }

    /// Sets the wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the DPI floor.
    pub fn with_dpi_floor(mut self, dpi: u32) -> Self {
        self.dpi_floor = dpi;
        self
    }

    /// Sets the temp-dir root.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }
}

/// Sandbox for untrusted generated renderer code.
///
/// The sole filesystem/process boundary in the pipeline. Exposed to the
/// orchestrator behind the render-backend interface so a test double can
/// stand in for it.
#[derive(Debug)]
pub struct CodeSandbox {
    config: SandboxConfig,
}

impl CodeSandbox {
    /// Creates a sandbox with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Creates a sandbox with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SandboxConfig::default())
    }

    /// The active configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Executes generated source and returns the raster bytes it produced.
    ///
    /// Rejection happens before any process is spawned or any file written;
    /// a source that fails the scan never touches the filesystem.
    pub async fn execute(
        &self,
        source: &str,
        runtime: SandboxRuntime,
    ) -> Result<Vec<u8>, SandboxError> {
        scan_source(source, runtime)?;

        let prepared = self.prepare_source(source, runtime);

        let dir = match &self.config.work_root {
            Some(root) => tempfile::tempdir_in(root)?,
            None => tempfile::tempdir()?,
        };
        let source_path = dir.path().join("render.py");
        let output_path = dir.path().join("diagram.png");

        tokio::fs::write(&source_path, prepared.replace("{OUTPUT}", &output_path.to_string_lossy()))
            .await?;

        debug!(runtime = %runtime, dir = %dir.path().display(), "Executing generated renderer source");

        let child = Command::new(&self.config.python_bin)
            .arg(&source_path)
            .current_dir(dir.path())
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("MPLBACKEND", "Agg")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(waited) => waited?,
            Err(_) => {
                // Dropping the wait future kills the child (kill_on_drop);
                // dropping `dir` removes every artifact it wrote.
                warn!(runtime = %runtime, timeout = ?self.config.timeout, "Renderer execution timed out");
                return Err(SandboxError::Timeout { seconds: self.config.timeout.as_secs() });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.chars().take(2000).collect::<String>();
            return Err(SandboxError::RuntimeError {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let bytes = tokio::fs::read(&output_path)
            .await
            .map_err(|_| SandboxError::MissingArtifact)?;

        // A renderer that exits cleanly can still write a truncated file.
        if image::load_from_memory(&bytes).is_err() {
            return Err(SandboxError::MissingArtifact);
        }

        Ok(bytes)
    }

    /// Wraps user source with the non-negotiable boilerplate: headless
    /// backend, controlled output path, canvas and DPI floors applied after
    /// user code so it cannot override them. Any save call in the user
    /// source is rewritten to the controlled path.
    fn prepare_source(&self, source: &str, runtime: SandboxRuntime) -> String {
        let rewritten = rewrite_save_targets(source);

        // Headless mode is pinned through MPLBACKEND in the child
        // environment, which user code cannot unset from inside the script.
        let prelude = match runtime {
            SandboxRuntime::Matplotlib | SandboxRuntime::Schemdraw => {
                "import matplotlib\n\
                 import matplotlib.pyplot as plt\n\
                 _DIAGRAM_OUTPUT = r\"{OUTPUT}\"\n"
                    .to_string()
            }
            SandboxRuntime::Graphviz => "_DIAGRAM_OUTPUT = r\"{OUTPUT}\"\n".to_string(),
        };

        let epilogue = match runtime {
            SandboxRuntime::Matplotlib | SandboxRuntime::Schemdraw => format!(
                "\n_fig = plt.gcf()\n\
                 _w, _h = _fig.get_size_inches()\n\
                 _fig.set_size_inches(max(_w, {min_in}), max(_h, {min_in}))\n\
                 plt.savefig(_DIAGRAM_OUTPUT, dpi={dpi}, bbox_inches=\"tight\")\n",
                min_in = self.config.min_canvas_inches,
                dpi = self.config.dpi_floor,
            ),
            SandboxRuntime::Graphviz => format!(
                "\ng.attr(dpi=\"{dpi}\")\n\
                 _png = g.pipe(format=\"png\")\n\
                 with __builtins__.open(_DIAGRAM_OUTPUT, \"wb\") as _f:\n    _f.write(_png)\n",
                dpi = self.config.dpi_floor,
            ),
        };

        format!("{prelude}\n{rewritten}\n{epilogue}")
    }
}

/// Rejects source containing denied patterns or imports outside the
/// runtime's allow-list. Pure text analysis; runs before any file or
/// process exists.
pub fn scan_source(source: &str, runtime: SandboxRuntime) -> Result<(), SandboxError> {
    for (pattern, label) in DENIED_PATTERNS {
        let re = Regex::new(pattern).expect("static deny pattern");
        if re.is_match(source) {
            return Err(SandboxError::DisallowedPattern { pattern: (*label).to_string() });
        }
    }

    let import_re =
        Regex::new(r"(?m)^\s*(?:import|from)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("static regex");
    for captures in import_re.captures_iter(source) {
        let module = &captures[1];
        if !runtime.allowed_imports().contains(&module) {
            return Err(SandboxError::DisallowedImport { module: module.to_string() });
        }
    }

    Ok(())
}

/// Rewrites string-literal save targets so user code cannot pick its own
/// output location. Best effort only; the epilogue save is the guarantee.
fn rewrite_save_targets(source: &str) -> String {
    let re = Regex::new(r#"((?:savefig|save|render)\s*\(\s*)['"][^'"]*['"]"#)
        .expect("static regex");
    re.replace_all(source, "${1}_DIAGRAM_OUTPUT").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_for_backend() {
        assert_eq!(
            SandboxRuntime::for_backend(BackendKind::ProceduralPlot),
            Some(SandboxRuntime::Matplotlib)
        );
        assert_eq!(
            SandboxRuntime::for_backend(BackendKind::CircuitSchematic),
            Some(SandboxRuntime::Schemdraw)
        );
        assert_eq!(
            SandboxRuntime::for_backend(BackendKind::GraphLayout),
            Some(SandboxRuntime::Graphviz)
        );
        assert_eq!(SandboxRuntime::for_backend(BackendKind::MarkupRaster), None);
        assert_eq!(SandboxRuntime::for_backend(BackendKind::GenerativeImage), None);
    }

    #[test]
    fn scan_rejects_denied_patterns() {
        let source = "import matplotlib\nimport subprocess\n";
        let err = scan_source(source, SandboxRuntime::Matplotlib).unwrap_err();
        assert!(matches!(err, SandboxError::DisallowedPattern { .. }));

        let source = "x = eval('1+1')\n";
        assert!(scan_source(source, SandboxRuntime::Matplotlib).is_err());

        let source = "f = open('/etc/passwd')\n";
        assert!(scan_source(source, SandboxRuntime::Matplotlib).is_err());
    }

    #[test]
    fn scan_rejects_imports_outside_allow_list() {
        let source = "import requests\n";
        let err = scan_source(source, SandboxRuntime::Matplotlib).unwrap_err();
        match err {
            SandboxError::DisallowedImport { module } => assert_eq!(module, "requests"),
            other => panic!("expected DisallowedImport, got {other:?}"),
        }
    }

    #[test]
    fn scan_accepts_allowed_source() {
        let source = "import matplotlib.pyplot as plt\nimport numpy as np\n\
                      from math import pi\nplt.plot([1, 2], [3, 4])\n";
        assert!(scan_source(source, SandboxRuntime::Matplotlib).is_ok());
    }

    #[test]
    fn scan_allow_list_differs_per_runtime() {
        let source = "import schemdraw\n";
        assert!(scan_source(source, SandboxRuntime::Schemdraw).is_ok());
        assert!(scan_source(source, SandboxRuntime::Matplotlib).is_err());
    }

    #[test]
    fn save_targets_are_rewritten() {
        let source = "plt.savefig(\"mine.png\", dpi=80)\nd.save('circuit.svg')\n";
        let rewritten = rewrite_save_targets(source);
        assert!(rewritten.contains("savefig(_DIAGRAM_OUTPUT, dpi=80)"));
        assert!(rewritten.contains("save(_DIAGRAM_OUTPUT)"));
        assert!(!rewritten.contains("mine.png"));
    }

    #[test]
    fn prepared_source_pins_backend_and_output() {
        let sandbox = CodeSandbox::with_defaults();
        let prepared = sandbox.prepare_source("plt.plot([1], [1])", SandboxRuntime::Matplotlib);
        assert!(prepared.starts_with("import matplotlib\nimport matplotlib.pyplot as plt"));
        assert!(prepared.contains("_DIAGRAM_OUTPUT"));
        assert!(prepared.contains("dpi=150"));
        // Epilogue save lands after user code.
        let user = prepared.find("plt.plot").expect("user code present");
        let save = prepared.rfind("plt.savefig").expect("epilogue save present");
        assert!(save > user);
    }

    #[tokio::test]
    async fn rejection_happens_before_any_spawn() {
        // A nonexistent interpreter would turn any spawn into an Io error;
        // the scan must reject first.
        let root = tempfile::tempdir().expect("temp root");
        let config = SandboxConfig::new()
            .with_python_bin("/nonexistent/interpreter")
            .with_work_root(root.path());
        let sandbox = CodeSandbox::new(config);

        let err = sandbox
            .execute("import requests\n", SandboxRuntime::Matplotlib)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::DisallowedImport { .. }));

        let leftovers: Vec<_> = std::fs::read_dir(root.path()).expect("scan root").collect();
        assert!(leftovers.is_empty(), "no temp artifacts may exist: {leftovers:?}");
    }

    #[tokio::test]
    async fn runtime_failure_cleans_up_artifacts() {
        // `sh` stands in for the Python interpreter: the prelude lines fail
        // harmlessly and the user line exits nonzero.
        let root = tempfile::tempdir().expect("temp root");
        let config = SandboxConfig::new()
            .with_python_bin("sh")
            .with_work_root(root.path());
        let sandbox = CodeSandbox::new(config);

        let err = sandbox.execute("exit 3\n", SandboxRuntime::Matplotlib).await.unwrap_err();
        assert!(matches!(err, SandboxError::RuntimeError { code: 3, .. }));

        let leftovers: Vec<_> = std::fs::read_dir(root.path()).expect("scan root").collect();
        assert!(leftovers.is_empty(), "runtime failure must not leak artifacts");
    }

    #[tokio::test]
    async fn timeout_kills_process_and_cleans_up() {
        let root = tempfile::tempdir().expect("temp root");
        let config = SandboxConfig::new()
            .with_python_bin("sh")
            .with_timeout(Duration::from_millis(300))
            .with_work_root(root.path());
        let sandbox = CodeSandbox::new(config);

        let err = sandbox.execute("sleep 30\n", SandboxRuntime::Matplotlib).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));

        let leftovers: Vec<_> = std::fs::read_dir(root.path()).expect("scan root").collect();
        assert!(leftovers.is_empty(), "timeout must not leak artifacts");
    }

    #[tokio::test]
    #[ignore] // Requires python3 with matplotlib installed.
    async fn renders_a_real_plot() {
        let sandbox = CodeSandbox::with_defaults();
        let source = "import matplotlib.pyplot as plt\nplt.plot([0, 1, 2], [0, 1, 4])\n";
        let bytes = sandbox
            .execute(source, SandboxRuntime::Matplotlib)
            .await
            .expect("render should succeed");
        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
    }
}
