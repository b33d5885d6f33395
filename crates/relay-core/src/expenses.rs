//! Usage statistics derived from a user's expense ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::storage::{ExpenseRecord, UserSettings};

/// Records shown in the "recent transactions" section.
pub const RECENT_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseSummary {
    pub total_cost: f64,
    pub requests: usize,
    pub total_tokens: u64,
    pub last_7_days: f64,
    /// Requests per model, sorted by model id.
    pub by_model: BTreeMap<String, usize>,
    /// Up to [`RECENT_LIMIT`] latest records, oldest first.
    pub recent: Vec<ExpenseRecord>,
}

impl ExpenseSummary {
    pub fn from_settings(settings: &UserSettings, now: DateTime<Utc>) -> Self {
        let week_ago = now - Duration::days(7);
        let history = &settings.expense_history;

        let mut by_model = BTreeMap::new();
        let mut total_tokens = 0u64;
        let mut last_7_days = 0.0;
        for e in history {
            total_tokens += e.input_tokens + e.output_tokens;
            *by_model.entry(e.model.clone()).or_insert(0) += 1;
            if e.timestamp > week_ago {
                last_7_days += e.cost;
            }
        }

        let start = history.len().saturating_sub(RECENT_LIMIT);
        Self {
            total_cost: settings.total_expenses,
            requests: history.len(),
            total_tokens,
            last_7_days,
            by_model,
            recent: history[start..].to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::UserId, storage::ChatMode};

    fn at(now: DateTime<Utc>, days_ago: i64, model: &str, cost: f64) -> ExpenseRecord {
        ExpenseRecord {
            timestamp: now - Duration::days(days_ago),
            model: model.to_string(),
            input_tokens: 100,
            output_tokens: 50,
            cost,
        }
    }

    #[test]
    fn summarizes_ledger() {
        let now = Utc::now();
        let mut s = UserSettings::new(UserId(1), "m", ChatMode::WithoutHistory);
        s.push_expense(at(now, 30, "openai/gpt-4", 1.0));
        s.push_expense(at(now, 10, "openai/gpt-4", 0.5));
        for d in (0..5).rev() {
            s.push_expense(at(now, d, "anthropic/claude-3-sonnet", 0.1));
        }

        let sum = ExpenseSummary::from_settings(&s, now);
        assert_eq!(sum.requests, 7);
        assert_eq!(sum.total_tokens, 7 * 150);
        assert!((sum.total_cost - 2.0).abs() < 1e-9);
        assert!((sum.last_7_days - 0.5).abs() < 1e-9);
        assert_eq!(
            sum.by_model.into_iter().collect::<Vec<_>>(),
            vec![
                ("anthropic/claude-3-sonnet".to_string(), 5),
                ("openai/gpt-4".to_string(), 2)
            ]
        );
        assert_eq!(sum.recent.len(), RECENT_LIMIT);
        assert_eq!(sum.recent.last().unwrap().timestamp, now);
    }

    #[test]
    fn empty_ledger() {
        let s = UserSettings::new(UserId(1), "m", ChatMode::WithoutHistory);
        let sum = ExpenseSummary::from_settings(&s, Utc::now());
        assert!(sum.is_empty());
        assert!(sum.recent.is_empty());
        assert_eq!(sum.total_tokens, 0);
    }
}
