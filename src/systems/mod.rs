pub mod lu;
pub mod solved_systems;
pub mod system_builder;

pub use lu::LUSystem;
pub use solved_systems::ok_system::SolvedOKSystem;
pub use system_builder::{KrigingSystem, OKSystemBuilder};
