//! Domain and diagram-type taxonomy.
//!
//! Eight STEM domains, each enumerating the diagram types the pipeline can
//! produce for it. Every diagram type carries a preferred render backend and
//! a flag for whether generative image synthesis produces acceptable results
//! for it. The keyword lists drive the deterministic classification fallback.

use serde::{Deserialize, Serialize};

use crate::render::BackendKind;

/// The STEM domains the pipeline classifies questions into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Electrical,
    Mechanics,
    ComputerScience,
    Physics,
    Chemistry,
    Mathematics,
    ControlSystems,
    General,
}

impl Domain {
    /// Returns all domains.
    pub fn all() -> Vec<Domain> {
        vec![
            Domain::Electrical,
            Domain::Mechanics,
            Domain::ComputerScience,
            Domain::Physics,
            Domain::Chemistry,
            Domain::Mathematics,
            Domain::ControlSystems,
            Domain::General,
        ]
    }

    /// Diagram types this domain can request.
    pub fn diagram_types(&self) -> Vec<DiagramType> {
        use DiagramType::*;
        match self {
            Domain::Electrical => {
                vec![CircuitSchematic, LogicGateNetwork, CmosLayout, SignalWaveform]
            }
            Domain::Mechanics => {
                vec![FreeBodyDiagram, PulleySystem, BeamLoading, ProjectileTrajectory]
            }
            Domain::ComputerScience => {
                vec![BinaryTree, LinkedList, DirectedGraph, StateMachine, ArrayLayout, HashTable]
            }
            Domain::Physics => vec![RayOptics, FieldLines, EnergyLevels, WaveInterference],
            Domain::Chemistry => {
                vec![MolecularStructure, ReactionEnergyProfile, TitrationCurve, PhaseDiagram]
            }
            Domain::Mathematics => {
                vec![FunctionPlot, GeometricFigure, VennDiagram, NumberLine]
            }
            Domain::ControlSystems => vec![BlockDiagram, BodePlot, SignalFlowGraph],
            Domain::General => vec![ConceptSketch, DataChart],
        }
    }

    /// Default diagram type when classification yields only a domain.
    pub fn default_diagram_type(&self) -> DiagramType {
        self.diagram_types()[0]
    }

    /// Keywords the deterministic fallback scanner matches, lowercase.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Domain::Electrical => &[
                "circuit", "resistor", "capacitor", "inductor", "voltage", "current", "cmos",
                "inverter", "transistor", "mosfet", "op-amp", "opamp", "diode", "logic gate",
                "nand", "nmos", "pmos", "impedance", "kirchhoff",
            ],
            Domain::Mechanics => &[
                "force", "friction", "pulley", "incline", "free body", "beam", "torque",
                "projectile", "spring", "mass", "newton", "momentum",
            ],
            Domain::ComputerScience => &[
                "binary tree", "linked list", "graph", "node", "pointer", "hash", "stack",
                "queue", "automaton", "state machine", "traversal", "array", "algorithm",
            ],
            Domain::Physics => &[
                "lens", "mirror", "ray", "refraction", "electric field", "magnetic", "photon",
                "energy level", "interference", "wavelength", "optics",
            ],
            Domain::Chemistry => &[
                "molecule", "bond", "reaction", "titration", "ph", "equilibrium", "enthalpy",
                "activation energy", "isomer", "orbital", "phase diagram",
            ],
            Domain::Mathematics => &[
                "function", "derivative", "integral", "parabola", "triangle", "polygon",
                "venn", "set", "interval", "asymptote", "vertex",
            ],
            Domain::ControlSystems => &[
                "transfer function", "feedback", "bode", "block diagram", "gain", "phase margin",
                "closed-loop", "open-loop", "pid",
            ],
            Domain::General => &[],
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Domain::Electrical => "Electrical Engineering",
            Domain::Mechanics => "Mechanics",
            Domain::ComputerScience => "Computer Science",
            Domain::Physics => "Physics",
            Domain::Chemistry => "Chemistry",
            Domain::Mathematics => "Mathematics",
            Domain::ControlSystems => "Control Systems",
            Domain::General => "General",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Diagram types across all domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagramType {
    // Electrical
    CircuitSchematic,
    LogicGateNetwork,
    CmosLayout,
    SignalWaveform,
    // Mechanics
    FreeBodyDiagram,
    PulleySystem,
    BeamLoading,
    ProjectileTrajectory,
    // Computer science
    BinaryTree,
    LinkedList,
    DirectedGraph,
    StateMachine,
    ArrayLayout,
    HashTable,
    // Physics
    RayOptics,
    FieldLines,
    EnergyLevels,
    WaveInterference,
    // Chemistry
    MolecularStructure,
    ReactionEnergyProfile,
    TitrationCurve,
    PhaseDiagram,
    // Mathematics
    FunctionPlot,
    GeometricFigure,
    VennDiagram,
    NumberLine,
    // Control systems
    BlockDiagram,
    BodePlot,
    SignalFlowGraph,
    // General
    ConceptSketch,
    DataChart,
}

impl DiagramType {
    /// The backend that renders this type best.
    pub fn preferred_backend(&self) -> BackendKind {
        use DiagramType::*;
        match self {
            CircuitSchematic | LogicGateNetwork | CmosLayout => BackendKind::CircuitSchematic,
            SignalWaveform | ProjectileTrajectory | FieldLines | WaveInterference
            | ReactionEnergyProfile | TitrationCurve | PhaseDiagram | FunctionPlot
            | VennDiagram | BodePlot | DataChart => BackendKind::ProceduralPlot,
            BinaryTree | LinkedList | DirectedGraph | StateMachine | BlockDiagram
            | SignalFlowGraph => BackendKind::GraphLayout,
            BeamLoading | ArrayLayout | HashTable | EnergyLevels | GeometricFigure
            | NumberLine => BackendKind::MarkupRaster,
            FreeBodyDiagram | PulleySystem | RayOptics | MolecularStructure | ConceptSketch => {
                BackendKind::GenerativeImage
            }
        }
    }

    /// Whether generative image synthesis produces acceptable results for
    /// this type. Structured diagrams with exact topology (circuits, trees,
    /// waveforms) do not tolerate the approximation.
    pub fn ai_suitable(&self) -> bool {
        matches!(
            self,
            DiagramType::FreeBodyDiagram
                | DiagramType::PulleySystem
                | DiagramType::RayOptics
                | DiagramType::MolecularStructure
                | DiagramType::ConceptSketch
        )
    }

    /// Name used in classification prompts and wire formats.
    pub fn wire_name(&self) -> &'static str {
        use DiagramType::*;
        match self {
            CircuitSchematic => "circuit-schematic",
            LogicGateNetwork => "logic-gate-network",
            CmosLayout => "cmos-layout",
            SignalWaveform => "signal-waveform",
            FreeBodyDiagram => "free-body-diagram",
            PulleySystem => "pulley-system",
            BeamLoading => "beam-loading",
            ProjectileTrajectory => "projectile-trajectory",
            BinaryTree => "binary-tree",
            LinkedList => "linked-list",
            DirectedGraph => "directed-graph",
            StateMachine => "state-machine",
            ArrayLayout => "array-layout",
            HashTable => "hash-table",
            RayOptics => "ray-optics",
            FieldLines => "field-lines",
            EnergyLevels => "energy-levels",
            WaveInterference => "wave-interference",
            MolecularStructure => "molecular-structure",
            ReactionEnergyProfile => "reaction-energy-profile",
            TitrationCurve => "titration-curve",
            PhaseDiagram => "phase-diagram",
            FunctionPlot => "function-plot",
            GeometricFigure => "geometric-figure",
            VennDiagram => "venn-diagram",
            NumberLine => "number-line",
            BlockDiagram => "block-diagram",
            BodePlot => "bode-plot",
            SignalFlowGraph => "signal-flow-graph",
            ConceptSketch => "concept-sketch",
            DataChart => "data-chart",
        }
    }
}

impl std::fmt::Display for DiagramType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Complexity grade assigned during classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}
