//! Token usage accounting.
//!
//! Every counter is optional: a provider that does not report a value leaves it
//! `None`. Combining two usages keeps a counter absent only when both sides lack
//! it; otherwise the missing side counts as zero.

use serde::{Deserialize, Serialize};

/// Token usage of one model call, or the sum over several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u64>,
}

impl Usage {
    /// Usage with input/output counts and a derived total.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            total_tokens: Some(input_tokens.saturating_add(output_tokens)),
            ..Default::default()
        }
    }

    /// Pairwise sum of two usages.
    pub fn add(&self, other: &Usage) -> Usage {
        Usage {
            input_tokens: add_token_counts(self.input_tokens, other.input_tokens),
            output_tokens: add_token_counts(self.output_tokens, other.output_tokens),
            total_tokens: add_token_counts(self.total_tokens, other.total_tokens),
            reasoning_tokens: add_token_counts(self.reasoning_tokens, other.reasoning_tokens),
            cached_input_tokens: add_token_counts(
                self.cached_input_tokens,
                other.cached_input_tokens,
            ),
        }
    }

    /// Sum of an iterator of usages, starting from the empty usage.
    pub fn sum<'a>(usages: impl IntoIterator<Item = &'a Usage>) -> Usage {
        usages
            .into_iter()
            .fold(Usage::default(), |acc, u| acc.add(u))
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage::add(&self, &rhs)
    }
}

fn add_token_counts(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn undefined_stays_undefined() {
        let a = Usage::default();
        let b = Usage {
            input_tokens: Some(3),
            ..Default::default()
        };
        let sum = a.add(&b);
        assert_eq!(sum.input_tokens, Some(3));
        assert_eq!(sum.output_tokens, None);
        assert_eq!(sum.total_tokens, None);
    }

    #[test]
    fn oversized_counts_saturate() {
        let huge = Usage {
            input_tokens: Some(u64::MAX),
            ..Default::default()
        };
        let one = Usage {
            input_tokens: Some(1),
            ..Default::default()
        };
        assert_eq!((huge + one).input_tokens, Some(u64::MAX));
        assert_eq!(Usage::new(u64::MAX, 2).total_tokens, Some(u64::MAX));
    }

    #[test]
    fn serializes_camel_case_and_skips_missing() {
        let v = serde_json::to_value(Usage::new(1, 2)).unwrap();
        assert_eq!(v, serde_json::json!({"inputTokens":1,"outputTokens":2,"totalTokens":3}));
    }

    fn opt_count() -> impl Strategy<Value = Option<u64>> {
        prop::option::of(0u64..10_000)
    }

    fn usage() -> impl Strategy<Value = Usage> {
        (opt_count(), opt_count(), opt_count(), opt_count(), opt_count()).prop_map(
            |(i, o, t, r, c)| Usage {
                input_tokens: i,
                output_tokens: o,
                total_tokens: t,
                reasoning_tokens: r,
                cached_input_tokens: c,
            },
        )
    }

    proptest! {
        #[test]
        fn total_equals_pairwise_sum(steps in prop::collection::vec(usage(), 0..8)) {
            let total = Usage::sum(&steps);
            let expected_input: Option<u64> = if steps.iter().all(|s| s.input_tokens.is_none()) {
                None
            } else {
                Some(steps.iter().filter_map(|s| s.input_tokens).sum())
            };
            prop_assert_eq!(total.input_tokens, expected_input);
        }

        #[test]
        fn addition_is_commutative(a in usage(), b in usage()) {
            prop_assert_eq!(a.add(&b), b.add(&a));
        }
    }
}
