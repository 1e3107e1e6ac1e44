pub mod catalog;
pub mod core;
pub mod llm;
pub mod rag;
pub mod recommend;
pub mod server;
pub mod state;
pub mod vector_math;
