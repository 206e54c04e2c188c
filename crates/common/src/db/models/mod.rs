//! SeaORM entity models
//!
//! Read-only mappings of the corpus tables

mod paper;
mod chunk;

pub use paper::{
    Entity as PaperEntity,
    Model as PaperModel,
    Column as PaperColumn,
};

pub use chunk::{
    Entity as PaperChunkEntity,
    Model as PaperChunkModel,
    Column as PaperChunkColumn,
};
