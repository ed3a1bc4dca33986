pub mod inference;
pub mod ollama_client;
pub mod openai_client;

pub use inference::{
    ArtifactWriter, ConnectivityProbe, InferenceFailure, InferenceInvoker, InferenceOutput,
};
pub use ollama_client::{OllamaClient, OllamaProbe};
pub use openai_client::{OpenAiClient, OpenAiProbe};
