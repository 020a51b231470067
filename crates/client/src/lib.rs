// Herding game client core
// Predicts the local sheepdog, reconciles it against the server and
// interpolates everything else for a presentation layer to draw.

// Module structure - each module handles a specific concern
pub mod network;       // WebSocket connection, staged packet queue
pub mod game;          // Client game state, entity views
pub mod prediction;    // Local dog prediction and reconciliation
pub mod interpolation; // Snapshot buffer for remote dogs and sheep
pub mod input;         // Keyboard state to movement intent
pub mod utils;         // Helper functions, LERP, clock

pub use game::{ClientGame, CorrectionStats, EntityKind, EntityView};
pub use input::InputState;
pub use interpolation::{InterpolationBuffer, Pose};
pub use network::Connection;
pub use prediction::{Correction, LocalPredictor, ReconcileTuning};
