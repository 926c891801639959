//! Backend routing: (domain, diagram type) to (backend, subtype, guidance).
//!
//! A static lookup with no I/O and no model calls. The subtype refines the
//! backend's behavior (which structural rules and prompt template apply);
//! the guidance text comes from the per-domain style registry and is passed
//! through opaque. Unmatched keys resolve to a fixed default rather than
//! failing — routing must never be the reason a pipeline dies.

pub mod styles;

use crate::classify::{DiagramType, Domain};
use crate::render::BackendKind;

/// A routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub backend: BackendKind,
    pub subtype: &'static str,
    pub guidance: &'static str,
}

/// The fixed default for unmatched (domain, diagram type) keys.
const DEFAULT_ROUTE: Route = Route {
    backend: BackendKind::ProceduralPlot,
    subtype: "chart",
    guidance: "Prefer a clean, minimal technical-illustration style with a white background, \
               clear sans-serif labels and high contrast.",
};

/// Static router over the compiled-in table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendRouter;

impl BackendRouter {
    /// Creates a router.
    pub fn new() -> Self {
        Self
    }

    /// Routes a (domain, diagram type) pair. Pure and deterministic; a
    /// diagram type that does not belong to the domain is an unmatched key
    /// and resolves to the default.
    pub fn route(&self, domain: Domain, diagram_type: DiagramType) -> Route {
        if !domain.diagram_types().contains(&diagram_type) {
            return DEFAULT_ROUTE;
        }

        Route {
            backend: diagram_type.preferred_backend(),
            subtype: subtype_for(diagram_type),
            guidance: styles::guidance(domain),
        }
    }
}

/// Subtype table: one entry per diagram type.
fn subtype_for(diagram_type: DiagramType) -> &'static str {
    use DiagramType::*;
    match diagram_type {
        CircuitSchematic => "analog",
        LogicGateNetwork => "logic",
        CmosLayout => "cmos",
        SignalWaveform => "waveform",
        FreeBodyDiagram => "free-body",
        PulleySystem => "pulley",
        BeamLoading => "beam",
        ProjectileTrajectory => "trajectory",
        BinaryTree => "tree",
        LinkedList => "list",
        DirectedGraph => "digraph",
        StateMachine => "automaton",
        ArrayLayout => "array",
        HashTable => "hash-table",
        RayOptics => "optics",
        FieldLines => "field",
        EnergyLevels => "energy-levels",
        WaveInterference => "interference",
        MolecularStructure => "molecule",
        ReactionEnergyProfile => "energy-profile",
        TitrationCurve => "titration",
        PhaseDiagram => "phase",
        FunctionPlot => "function",
        GeometricFigure => "geometry",
        VennDiagram => "venn",
        NumberLine => "number-line",
        BlockDiagram => "block",
        BodePlot => "bode",
        SignalFlowGraph => "signal-flow",
        ConceptSketch => "sketch",
        DataChart => "chart",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_pure() {
        let router = BackendRouter::new();
        let first = router.route(Domain::Electrical, DiagramType::CircuitSchematic);
        let second = router.route(Domain::Electrical, DiagramType::CircuitSchematic);
        assert_eq!(first, second);
    }

    #[test]
    fn circuit_routes_to_schematic_backend() {
        let router = BackendRouter::new();
        let route = router.route(Domain::Electrical, DiagramType::CircuitSchematic);
        assert_eq!(route.backend, BackendKind::CircuitSchematic);
        assert_eq!(route.subtype, "analog");
        assert!(route.guidance.contains("IEEE"));
    }

    #[test]
    fn unmatched_key_resolves_to_default() {
        let router = BackendRouter::new();
        // binary-tree does not belong to chemistry.
        let route = router.route(Domain::Chemistry, DiagramType::BinaryTree);
        assert_eq!(route, DEFAULT_ROUTE);
        assert_eq!(route.backend, BackendKind::ProceduralPlot);
    }

    #[test]
    fn every_valid_pair_routes_without_default_fallback() {
        let router = BackendRouter::new();
        for domain in Domain::all() {
            for diagram_type in domain.diagram_types() {
                let route = router.route(domain, diagram_type);
                assert_eq!(route.backend, diagram_type.preferred_backend());
                assert!(!route.subtype.is_empty());
                assert!(!route.guidance.is_empty());
            }
        }
    }

    #[test]
    fn guidance_comes_from_the_style_registry() {
        let router = BackendRouter::new();
        let route = router.route(Domain::Mechanics, DiagramType::FreeBodyDiagram);
        assert_eq!(route.guidance, styles::guidance(Domain::Mechanics));
    }
}
