pub mod dynamic;
pub mod library;
pub mod template;

pub use dynamic::{DynamicPromptGenerator, PromptComponent};
pub use library::PromptLibrary;
pub use template::PromptTemplate;
