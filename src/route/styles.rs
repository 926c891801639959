//! Per-domain style guidance injected into generation prompts.
//!
//! The router treats these as opaque text: they are written for the
//! generation models, never parsed. Keep them short and declarative; every
//! sentence costs prompt tokens on every attempt.

use crate::classify::Domain;

/// Style guidance for a domain.
pub fn guidance(domain: Domain) -> &'static str {
    match domain {
        Domain::Electrical => {
            "Use standard IEEE schematic symbols. Current flows left to right, ground at the \
             bottom. Label every component with its symbolic name from the question (R1, C2, \
             Vin) next to the component body. Keep wire crossings to a minimum and use dots \
             for junctions."
        }
        Domain::Mechanics => {
            "Draw forces as arrows with the arrowhead pointing away from the body, labeled with \
             symbolic names (F, N, mg, T). Show the coordinate axes in a corner. Keep bodies as \
             simple shapes (blocks, spheres) and surfaces as hatched lines."
        }
        Domain::ComputerScience => {
            "Nodes are circles or boxes with their values centered inside. Pointers and edges \
             are arrows; null pointers are shown as a slash or the word null. Lay out trees \
             top-down and lists left-to-right. Label indices where the question names them."
        }
        Domain::Physics => {
            "Use standard physics conventions: rays as arrows, field lines with direction \
             arrows, lenses as double-headed vertical arrows or lens outlines. Label focal \
             points, distances and angles with the symbols used in the question."
        }
        Domain::Chemistry => {
            "Use skeletal or Lewis structure conventions as appropriate. Label atoms, bonds \
             and charges explicitly. Reaction coordinate axes are labeled with energy on the \
             vertical axis. Keep stoichiometric labels symbolic."
        }
        Domain::Mathematics => {
            "Axes are labeled with variable names and scale marks. Curves are smooth with key \
             points (intercepts, vertices, asymptotes) marked and labeled symbolically. \
             Geometric figures show vertex labels and marked angles."
        }
        Domain::ControlSystems => {
            "Blocks are rectangles labeled with their transfer function in symbolic form. \
             Summing junctions are circles with signs at each input. Signal flow is left to \
             right with feedback paths drawn below the forward path."
        }
        Domain::General => {
            "Prefer a clean, minimal technical-illustration style with a white background, \
             clear sans-serif labels and high contrast."
        }
    }
}
