//! Procedural content for the water renderer: island terrain height fields
//! and the textures the water surface samples.

pub mod terrain;
pub mod textures;

pub use terrain::*;
pub use textures::*;
