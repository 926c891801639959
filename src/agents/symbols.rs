//! Valid-symbol catalogs for the procedural renderers.
//!
//! Generation prompts carry the list of names the target renderer actually
//! exposes, plus a deny-list of names models habitually invent. The static
//! catalogs mirror the renderer versions pinned in the sandbox image; when a
//! local interpreter is available the catalog is refreshed by introspecting
//! the installed renderer, so prompt and sandbox never drift apart.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::render::sandbox::SandboxRuntime;

/// schemdraw element classes (schemdraw.elements and schemdraw.logic).
const SCHEMDRAW_SYMBOLS: &[&str] = &[
    "Resistor", "ResistorIEC", "ResistorVar", "Capacitor", "Capacitor2", "Inductor", "Inductor2",
    "Diode", "LED", "Zener", "SourceV", "SourceI", "SourceSin", "SourceControlledV", "Battery",
    "Ground", "GroundSignal", "Switch", "Line", "Dot", "Label", "Opamp", "NFet", "PFet", "JFet",
    "BjtNpn", "BjtPnp", "Vdd", "Vss", "CurrentLabel", "Arrow", "Gap", "And", "Or", "Not", "Nand",
    "Nor", "Xor", "Xnor", "Buf", "Schmitt",
];

/// Names models invent for schemdraw that do not exist.
const SCHEMDRAW_DENIED: &[&str] = &[
    "VoltageSource", "CurrentSource", "Wire", "Cap", "Res", "Ind", "Transistor", "Mosfet",
    "OpAmp", "GroundElement", "DCSource", "ACSource", "Cell", "Node",
];

/// matplotlib.pyplot functions the plot rules reference.
const MATPLOTLIB_SYMBOLS: &[&str] = &[
    "plot", "scatter", "bar", "barh", "stem", "step", "fill_between", "errorbar", "annotate",
    "text", "arrow", "quiver", "axhline", "axvline", "hlines", "vlines", "xlabel", "ylabel",
    "title", "legend", "grid", "xlim", "ylim", "xticks", "yticks", "subplots", "gca", "axis",
    "pie", "hist", "imshow", "contour",
];

/// Names models invent for matplotlib, plus interactive calls the headless
/// sandbox forbids.
const MATPLOTLIB_DENIED: &[&str] = &[
    "show", "display", "draw_circuit", "plot_graph", "figure_size", "set_title_text", "pause",
];

/// graphviz API names (classes, methods and common attributes).
const GRAPHVIZ_SYMBOLS: &[&str] = &[
    "Digraph", "Graph", "node", "edge", "edges", "attr", "subgraph", "shape", "rankdir", "label",
    "circle", "doublecircle", "box", "record", "plaintext", "style", "color", "fontsize",
    "constraint", "dir",
];

/// Names models invent for graphviz, plus output calls the sandbox owns.
const GRAPHVIZ_DENIED: &[&str] = &["render", "view", "save", "Tree", "BinaryTree", "draw", "layout"];

/// Per-runtime probe that prints one usable symbol per line.
fn probe_script(runtime: SandboxRuntime) -> &'static str {
    match runtime {
        SandboxRuntime::Matplotlib => {
            "import matplotlib.pyplot as p\n\
             print(\"\\n\".join(n for n in dir(p) if not n.startswith(\"_\")))"
        }
        SandboxRuntime::Schemdraw => {
            "import schemdraw.elements as e\nimport schemdraw.logic as l\n\
             names = [n for n in dir(e) + dir(l) if n[:1].isupper()]\n\
             print(\"\\n\".join(sorted(set(names))))"
        }
        SandboxRuntime::Graphviz => {
            "import graphviz\n\
             print(\"\\n\".join(n for n in dir(graphviz) if n[:1].isupper()))"
        }
    }
}

/// Symbol catalog for a renderer runtime.
#[derive(Debug, Clone)]
pub struct SymbolCatalog {
    runtime: SandboxRuntime,
    symbols: Vec<String>,
}

impl SymbolCatalog {
    /// The baked-in catalog for a runtime.
    pub fn baked_in(runtime: SandboxRuntime) -> Self {
        let symbols = match runtime {
            SandboxRuntime::Matplotlib => MATPLOTLIB_SYMBOLS,
            SandboxRuntime::Schemdraw => SCHEMDRAW_SYMBOLS,
            SandboxRuntime::Graphviz => GRAPHVIZ_SYMBOLS,
        };
        Self {
            runtime,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Introspects the installed renderer for its real symbol list, falling
    /// back to the baked-in catalog when no interpreter (or renderer) is
    /// available. The probe is trusted code, not generated code, but still
    /// runs with a scrubbed environment and a short timeout.
    pub async fn introspect(runtime: SandboxRuntime, python_bin: &str) -> Self {
        let result = Command::new(python_bin)
            .arg("-c")
            .arg(probe_script(runtime))
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(10), result).await {
            Ok(Ok(output)) if output.status.success() => output,
            _ => {
                debug!(runtime = %runtime, "Symbol introspection unavailable, using baked-in catalog");
                return Self::baked_in(runtime);
            }
        };

        let symbols: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if symbols.is_empty() {
            return Self::baked_in(runtime);
        }

        debug!(runtime = %runtime, count = symbols.len(), "Introspected renderer symbols");
        Self { runtime, symbols }
    }

    /// The runtime this catalog describes.
    pub fn runtime(&self) -> SandboxRuntime {
        self.runtime
    }

    /// Valid symbol names, one prompt line's worth.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Names models commonly hallucinate for this runtime.
    pub fn denied(&self) -> &'static [&'static str] {
        match self.runtime {
            SandboxRuntime::Matplotlib => MATPLOTLIB_DENIED,
            SandboxRuntime::Schemdraw => SCHEMDRAW_DENIED,
            SandboxRuntime::Graphviz => GRAPHVIZ_DENIED,
        }
    }

    /// Comma-separated symbol list for prompt injection.
    pub fn symbols_line(&self) -> String {
        self.symbols.join(", ")
    }

    /// Comma-separated deny-list for prompt injection.
    pub fn denied_line(&self) -> String {
        self.denied().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baked_in_catalogs_are_nonempty() {
        for runtime in [
            SandboxRuntime::Matplotlib,
            SandboxRuntime::Schemdraw,
            SandboxRuntime::Graphviz,
        ] {
            let catalog = SymbolCatalog::baked_in(runtime);
            assert!(!catalog.symbols().is_empty());
            assert!(!catalog.denied().is_empty());
        }
    }

    #[test]
    fn schemdraw_catalog_excludes_hallucinated_names() {
        let catalog = SymbolCatalog::baked_in(SandboxRuntime::Schemdraw);
        for denied in catalog.denied() {
            assert!(
                !catalog.symbols().iter().any(|s| s == denied),
                "'{denied}' is in both the catalog and the deny-list"
            );
        }
    }

    #[test]
    fn prompt_lines_are_joined() {
        let catalog = SymbolCatalog::baked_in(SandboxRuntime::Graphviz);
        assert!(catalog.symbols_line().contains("Digraph, Graph"));
        assert!(catalog.denied_line().contains("render"));
    }

    #[tokio::test]
    async fn introspection_falls_back_without_interpreter() {
        let catalog =
            SymbolCatalog::introspect(SandboxRuntime::Schemdraw, "/nonexistent/python").await;
        assert_eq!(catalog.symbols().len(), SCHEMDRAW_SYMBOLS.len());
    }
}
