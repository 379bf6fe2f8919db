//! Built-in model catalog.

use crate::domain::{ModelTarget, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogModel {
    pub provider: Provider,
    pub model: &'static str,
    pub label: &'static str,
}

impl CatalogModel {
    pub fn target(&self) -> ModelTarget {
        ModelTarget::new(self.provider, self.model, self.label)
    }
}

const MODELS: &[CatalogModel] = &[
    CatalogModel {
        provider: Provider::OpenAi,
        model: "gpt-4o",
        label: "GPT-4o",
    },
    CatalogModel {
        provider: Provider::OpenAi,
        model: "gpt-5",
        label: "GPT-5",
    },
    CatalogModel {
        provider: Provider::OpenAi,
        model: "gpt-5-chat-latest",
        label: "GPT-5 Chat",
    },
    CatalogModel {
        provider: Provider::Anthropic,
        model: "claude-sonnet-4-0",
        label: "Claude Sonnet 4",
    },
    CatalogModel {
        provider: Provider::Anthropic,
        model: "claude-sonnet-4-5",
        label: "Claude Sonnet 4.5",
    },
    CatalogModel {
        provider: Provider::Anthropic,
        model: "claude-opus-4-0",
        label: "Claude Opus 4",
    },
    CatalogModel {
        provider: Provider::Anthropic,
        model: "claude-opus-4-5",
        label: "Claude Opus 4.5",
    },
    CatalogModel {
        provider: Provider::Anthropic,
        model: "claude-haiku-4-5",
        label: "Claude Haiku 4.5",
    },
    CatalogModel {
        provider: Provider::Vercel,
        model: "v0-1.5-md",
        label: "v0-1.5-md",
    },
    CatalogModel {
        provider: Provider::Google,
        model: "gemini-2.5-flash",
        label: "Gemini 2.5 Flash",
    },
    CatalogModel {
        provider: Provider::Google,
        model: "gemini-3-pro-preview",
        label: "Gemini 3 Pro Preview",
    },
];

pub fn models() -> &'static [CatalogModel] {
    MODELS
}

pub fn find_model(model: &str) -> Option<&'static CatalogModel> {
    MODELS.iter().find(|m| m.model == model)
}

/// Provider for a model id: catalog entry first, then prefix inference.
pub fn provider_for(model: &str) -> Provider {
    find_model(model)
        .map(|m| m.provider)
        .unwrap_or_else(|| Provider::infer(model))
}
