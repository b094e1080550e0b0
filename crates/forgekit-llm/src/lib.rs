pub mod openai;
pub mod retry;

pub use openai::OpenAiProvider;
pub use retry::RetryingProvider;
