pub mod json;
pub mod key_value;

pub use json::JsonParser;
pub use key_value::KeyValueParser;
