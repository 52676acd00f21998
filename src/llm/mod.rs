//! LLM 层：语言模型抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockLanguageModel;
pub use openai::OpenAiClient;
pub use traits::{LanguageModel, LlmError, LlmResponse};
