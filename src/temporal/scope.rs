use super::{TemporalConfig, Timestamp};
use crate::core::Value;
use crate::storage::Filter;

/// Query scope over validity intervals. The default scope makes only active
/// rows (`valid_to == sentinel`) visible; the other variants widen or narrow
/// visibility into history.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TemporalScope {
    /// Only active rows. Applied implicitly on every read.
    #[default]
    Active,
    /// No temporal filter at all: active and historical rows.
    WithTrashed,
    /// Only closed rows (`valid_to < sentinel`).
    OnlyTrashed,
    /// Explicit active filter, bypassing any other scope state.
    WithoutTrashed,
    /// Closed rows whose interval opened exactly at the given instant.
    TrashedOn(Timestamp),
    /// Closed rows whose validity interval overlaps `[from, to]`, optionally
    /// narrowed to a single identity.
    TrashedBetween {
        from: Timestamp,
        to: Timestamp,
        id: Option<Value>,
    },
}

impl TemporalScope {
    /// Translate the scope into storage filters for an entity with the given
    /// temporal configuration. `key_column` is consulted only by
    /// [`TemporalScope::TrashedBetween`] when an identity is supplied.
    pub fn filters(&self, temporal: &TemporalConfig, key_column: Option<&str>) -> Vec<Filter> {
        let end = temporal.end_column.as_str();
        let start = temporal.start_column.as_str();
        let sentinel = temporal.max_timestamp;

        match self {
            Self::Active | Self::WithoutTrashed => {
                vec![Filter::eq(end, sentinel)]
            }
            Self::WithTrashed => Vec::new(),
            Self::OnlyTrashed => vec![Filter::lt(end, sentinel)],
            Self::TrashedOn(timestamp) => vec![
                Filter::lt(end, sentinel),
                Filter::eq(start, *timestamp),
            ],
            Self::TrashedBetween { from, to, id } => {
                let mut filters = Vec::new();
                if let (Some(column), Some(id)) = (key_column, id) {
                    filters.push(Filter::eq(column, id.clone()));
                }
                filters.push(Filter::le(start, *to));
                filters.push(Filter::ge(end, *from));
                filters.push(Filter::lt(end, sentinel));
                filters
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilterOp;

    #[test]
    fn test_default_scope_is_active_only() {
        let temporal = TemporalConfig::default();
        let filters = TemporalScope::default().filters(&temporal, None);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].column, "valid_to");
        assert_eq!(filters[0].op, FilterOp::Eq);
        assert_eq!(filters[0].value, temporal.max_timestamp.value());
    }

    #[test]
    fn test_with_trashed_removes_filter() {
        let temporal = TemporalConfig::default();
        assert!(TemporalScope::WithTrashed.filters(&temporal, None).is_empty());
    }

    #[test]
    fn test_trashed_between_includes_identity() {
        let temporal = TemporalConfig::default();
        let scope = TemporalScope::TrashedBetween {
            from: Timestamp::from_millis(1_000),
            to: Timestamp::from_millis(2_000),
            id: Some(Value::Integer(7)),
        };
        let filters = scope.filters(&temporal, Some("id"));
        assert_eq!(filters.len(), 4);
        assert_eq!(filters[0].column, "id");
    }
}
