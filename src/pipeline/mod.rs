//! 会话流水线：suggest / generate 两次状态迁移与同意门控副作用

pub mod error;
pub mod runner;

pub use error::PipelineError;
pub use runner::{
    GenerateRequest, GenerateResponse, Pipeline, SuggestRequest, SuggestResponse,
};
