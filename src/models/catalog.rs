//! Static model catalog compiled into the crate.

use super::capabilities::{ModelCapabilities, Pricing};
use super::provider_key::ProviderKey;
use super::{Model, ModelKind};

struct Entry {
    id: &'static str,
    provider: ProviderKey,
    kind: ModelKind,
    name: &'static str,
    tools: bool,
    vision: bool,
    json: bool,
    streaming: bool,
    context: u32,
    max_output: Option<u32>,
    pricing: Option<Pricing>,
}

impl Entry {
    const fn chat(id: &'static str, provider: ProviderKey, name: &'static str) -> Self {
        Self {
            id,
            provider,
            kind: ModelKind::Chat,
            name,
            tools: true,
            vision: true,
            json: true,
            streaming: true,
            context: 128_000,
            max_output: None,
            pricing: None,
        }
    }

    const fn kind(mut self, kind: ModelKind) -> Self {
        self.kind = kind;
        self.tools = false;
        self.vision = false;
        self.json = false;
        self.streaming = false;
        self
    }

    const fn no_tools(mut self) -> Self {
        self.tools = false;
        self
    }

    const fn no_vision(mut self) -> Self {
        self.vision = false;
        self
    }

    const fn no_json(mut self) -> Self {
        self.json = false;
        self
    }

    const fn no_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    const fn window(mut self, context: u32, max_output: u32) -> Self {
        self.context = context;
        self.max_output = Some(max_output);
        self
    }

    const fn price(mut self, input: f64, output: f64) -> Self {
        self.pricing = Some(Pricing::new(input, output));
        self
    }

    fn to_model(&self) -> Model {
        Model {
            id: self.id.to_string(),
            provider: self.provider,
            kind: self.kind,
            display_name: self.name.to_string(),
            capabilities: ModelCapabilities {
                supports_vision: self.vision,
                supports_tools: self.tools,
                supports_streaming: self.streaming,
                supports_json_mode: self.json,
                context_length: self.context,
                max_output_tokens: self.max_output,
                pricing: self.pricing,
            },
        }
    }
}

use ProviderKey::{Anthropic, Bedrock, DeepSeek, Gemini, OpenAi};

const CATALOG: &[Entry] = &[
    // OpenAI
    Entry::chat("gpt-4.1", OpenAi, "GPT-4.1").window(1_047_576, 32_768).price(2.0, 8.0),
    Entry::chat("gpt-4.1-mini", OpenAi, "GPT-4.1 mini").window(1_047_576, 32_768).price(0.4, 1.6),
    Entry::chat("gpt-4.1-nano", OpenAi, "GPT-4.1 nano").window(1_047_576, 32_768).price(0.1, 0.4),
    Entry::chat("gpt-4o", OpenAi, "GPT-4o").window(128_000, 16_384).price(2.5, 10.0),
    Entry::chat("gpt-4o-mini", OpenAi, "GPT-4o mini").window(128_000, 16_384).price(0.15, 0.6),
    Entry::chat("o3-mini", OpenAi, "o3-mini").no_vision().window(200_000, 100_000).price(1.1, 4.4),
    Entry::chat("text-embedding-3-small", OpenAi, "text-embedding-3-small")
        .kind(ModelKind::Embedding)
        .window(8_191, 0)
        .price(0.02, 0.0),
    Entry::chat("text-embedding-3-large", OpenAi, "text-embedding-3-large")
        .kind(ModelKind::Embedding)
        .window(8_191, 0)
        .price(0.13, 0.0),
    Entry::chat("dall-e-3", OpenAi, "DALL-E 3").kind(ModelKind::Image).window(4_000, 0),
    // Anthropic
    Entry::chat("claude-3-5-haiku-20241022", Anthropic, "Claude 3.5 Haiku").window(200_000, 8_192).price(0.8, 4.0),
    Entry::chat("claude-3-5-sonnet-20241022", Anthropic, "Claude 3.5 Sonnet").window(200_000, 8_192).price(3.0, 15.0),
    Entry::chat("claude-3-7-sonnet-20250219", Anthropic, "Claude 3.7 Sonnet").window(200_000, 64_000).price(3.0, 15.0),
    Entry::chat("claude-sonnet-4-20250514", Anthropic, "Claude Sonnet 4").window(200_000, 64_000).price(3.0, 15.0),
    // Gemini
    Entry::chat("gemini-2.0-flash", Gemini, "Gemini 2.0 Flash").window(1_048_576, 8_192).price(0.1, 0.4),
    Entry::chat("gemini-1.5-pro", Gemini, "Gemini 1.5 Pro").window(2_097_152, 8_192).price(1.25, 5.0),
    Entry::chat("gemini-2.5-pro", Gemini, "Gemini 2.5 Pro").window(1_048_576, 65_536).price(1.25, 10.0),
    Entry::chat("text-embedding-004", Gemini, "Text Embedding 004").kind(ModelKind::Embedding).window(2_048, 0),
    Entry::chat("imagen-3.0-generate-002", Gemini, "Imagen 3").kind(ModelKind::Image).window(480, 0),
    // DeepSeek
    Entry::chat("deepseek-chat", DeepSeek, "DeepSeek V3").no_vision().window(64_000, 8_192).price(0.27, 1.1),
    Entry::chat("deepseek-reasoner", DeepSeek, "DeepSeek R1")
        .no_vision()
        .no_tools()
        .no_json()
        .window(64_000, 8_192)
        .price(0.55, 2.19),
    // Bedrock
    Entry::chat("anthropic.claude-3-5-haiku-20241022-v1:0", Bedrock, "Claude 3.5 Haiku (Bedrock)")
        .no_streaming()
        .window(200_000, 8_192)
        .price(0.8, 4.0),
    Entry::chat("anthropic.claude-3-5-sonnet-20241022-v2:0", Bedrock, "Claude 3.5 Sonnet v2 (Bedrock)")
        .no_streaming()
        .window(200_000, 8_192)
        .price(3.0, 15.0),
    Entry::chat("anthropic.claude-3-7-sonnet-20250219-v1:0", Bedrock, "Claude 3.7 Sonnet (Bedrock)")
        .no_streaming()
        .window(200_000, 64_000)
        .price(3.0, 15.0),
];

/// Every model known at compile time.
pub fn builtin_models() -> Vec<Model> {
    CATALOG.iter().map(Entry::to_model).collect()
}
