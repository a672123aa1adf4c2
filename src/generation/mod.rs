// Generation module
// Request/response boundary to the language model that writes the final reply

pub mod openai;

pub use openai::OpenAiGenerator;

use crate::Result;

/// Prompt in, text out. Output is only deterministic at temperature zero.
pub trait Generator {
    fn generate(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> Result<String>;
}

impl<T: Generator + ?Sized> Generator for &T {
    #[inline]
    fn generate(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> Result<String> {
        (**self).generate(system_prompt, user_prompt, temperature)
    }
}
