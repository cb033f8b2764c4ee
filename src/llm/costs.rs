//! Per-model token pricing, for operational cost visibility.
//!
//! Prices are USD per single token (provider list prices are per million;
//! stored here pre-divided). Unknown models fall back to zero so cost
//! logging never blocks a call.

use rust_decimal::Decimal;

use crate::llm::provider::CompletionResponse;

/// (input, output) USD cost per token for a model.
pub(crate) fn per_token(model: &str) -> (Decimal, Decimal) {
    // scale 8 → value * 10^-8; e.g. 300 = $0.000003/token = $3/Mtok
    let per_mtok = |input: i64, output: i64| {
        (
            Decimal::new(input, 8),
            Decimal::new(output, 8),
        )
    };

    match model {
        m if m.starts_with("claude-opus") => per_mtok(1500, 7500),
        m if m.starts_with("claude-sonnet") || m.contains("sonnet") => per_mtok(300, 1500),
        m if m.contains("haiku") => per_mtok(80, 400),
        m if m.starts_with("gpt-4o-mini") => per_mtok(15, 60),
        m if m.starts_with("gpt-4o") => per_mtok(250, 1000),
        _ => (Decimal::ZERO, Decimal::ZERO),
    }
}

/// Estimated USD cost of one response.
pub(crate) fn estimate(model: &str, response: &CompletionResponse) -> Decimal {
    let (input, output) = per_token(model);
    input * Decimal::from(response.input_tokens) + output * Decimal::from(response.output_tokens)
}

/// Debug-log the usage and estimated cost of one call.
pub(crate) fn log_usage(call: &str, model: &str, response: &CompletionResponse) {
    tracing::debug!(
        call,
        model,
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        cost_usd = %estimate(model, response),
        "LLM call complete"
    );
}
