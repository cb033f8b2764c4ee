//! Flow graph provider — the external source of per-intent question lists.
//!
//! The engine consumes flows read-only through the `FlowProvider` trait.
//! `StaticFlowProvider` carries the built-in real-estate graphs and is what
//! ships by default; a per-client content store can implement the same trait.

use async_trait::async_trait;

use crate::error::FlowError;
use crate::flow::model::{Choice, Flow, Intent, Question};

/// Read-only source of question flows.
#[async_trait]
pub trait FlowProvider: Send + Sync {
    /// The flow for an intent. `FlowError::MissingFlow` when no flow is
    /// configured — fatal for the session, never a generic retry.
    async fn flow(&self, intent: Intent) -> Result<Flow, FlowError>;
}

/// Built-in flows for the three visitor intents.
pub struct StaticFlowProvider {
    buy: Flow,
    sell: Flow,
    browse: Flow,
}

impl StaticFlowProvider {
    /// The default question graphs.
    pub fn default_flows() -> Self {
        let buy = Flow::new(
            Intent::Buy,
            vec![
                Question::new("buy-budget", "budget", "What price range are you shopping in?")
                    .with_choices(vec![
                        Choice::new("Under $400k", "under_400k"),
                        Choice::new("$400k – $700k", "400k_700k"),
                        Choice::new("$700k – $1M", "700k_1m"),
                        Choice::new("Over $1M", "over_1m"),
                    ]),
                Question::new(
                    "buy-timeline",
                    "timeline",
                    "When are you hoping to be in your new home?",
                )
                .with_choices(vec![
                    Choice::new("ASAP", "asap"),
                    Choice::new("Within 3 months", "0_3_months"),
                    Choice::new("3–6 months", "3_6_months"),
                    Choice::new("Just planning ahead", "6_plus_months"),
                ]),
                Question::new("buy-area", "area", "Which neighborhoods or areas are you considering?"),
                Question::new(
                    "buy-financing",
                    "financing",
                    "Have you been pre-approved for a mortgage yet?",
                )
                .with_choices(vec![
                    Choice::new("Yes, pre-approved", "pre_approved"),
                    Choice::new("Working on it", "in_progress"),
                    Choice::new("Not yet", "not_started"),
                    Choice::new("Paying cash", "cash"),
                ]),
                Question::new(
                    "buy-must-haves",
                    "must_haves",
                    "What are the must-haves for your next place?",
                ),
            ],
        );

        let sell = Flow::new(
            Intent::Sell,
            vec![
                Question::new(
                    "sell-property",
                    "property_type",
                    "What kind of property are you selling?",
                )
                .with_choices(vec![
                    Choice::new("Single-family home", "single_family"),
                    Choice::new("Condo / townhouse", "condo_townhouse"),
                    Choice::new("Multi-family", "multi_family"),
                    Choice::new("Land / other", "other"),
                ]),
                Question::new(
                    "sell-timeline",
                    "timeline",
                    "How soon are you looking to list?",
                )
                .with_choices(vec![
                    Choice::new("Right away", "asap"),
                    Choice::new("In the next few months", "0_3_months"),
                    Choice::new("Later this year", "this_year"),
                    Choice::new("Just exploring", "exploring"),
                ]),
                Question::new(
                    "sell-motivation",
                    "motivation",
                    "What's prompting the move, if you don't mind sharing?",
                ),
                Question::new(
                    "sell-next",
                    "next_step",
                    "Will you be buying another place once this one sells?",
                )
                .with_choices(vec![
                    Choice::new("Yes, locally", "buying_local"),
                    Choice::new("Yes, relocating", "relocating"),
                    Choice::new("No", "not_buying"),
                    Choice::new("Not sure yet", "undecided"),
                ]),
            ],
        );

        let browse = Flow::new(
            Intent::Browse,
            vec![
                Question::new(
                    "browse-interest",
                    "interest",
                    "What brings you to the market today?",
                )
                .with_choices(vec![
                    Choice::new("Curious about prices", "prices"),
                    Choice::new("Watching a neighborhood", "neighborhood"),
                    Choice::new("Thinking about buying someday", "future_buy"),
                    Choice::new("Thinking about selling someday", "future_sell"),
                ]),
                Question::new("browse-area", "area", "Any particular area you're keeping an eye on?"),
            ],
        );

        Self { buy, sell, browse }
    }

    /// A provider with no flows configured (for tests exercising the
    /// missing-flow error path).
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            buy: Flow::new(Intent::Buy, vec![]),
            sell: Flow::new(Intent::Sell, vec![]),
            browse: Flow::new(Intent::Browse, vec![]),
        }
    }
}

#[async_trait]
impl FlowProvider for StaticFlowProvider {
    async fn flow(&self, intent: Intent) -> Result<Flow, FlowError> {
        let flow = match intent {
            Intent::Buy => &self.buy,
            Intent::Sell => &self.sell,
            Intent::Browse => &self.browse,
        };
        if flow.is_empty() {
            return Err(FlowError::EmptyFlow { intent });
        }
        Ok(flow.clone())
    }
}
