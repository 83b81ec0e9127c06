/// A field records can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Timestamp,
    TransactionId,
    EntityId,
    EntityVersion,
    LeaseScope,
    LeaseLabel,
    LeaseValue,
    TagLabel,
    TagValue,
    /// Commit order of the record within its stream; unique per record
    Sequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortTerm {
    pub key: SortKey,
    pub ascending: bool,
}

/// Ordered list of sort terms, most significant first
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortOrder {
    terms: Vec<SortTerm>,
}

impl SortOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, key: SortKey) -> Self {
        self.terms.push(SortTerm {
            key,
            ascending: true,
        });
        self
    }

    pub fn descending(mut self, key: SortKey) -> Self {
        self.terms.push(SortTerm {
            key,
            ascending: false,
        });
        self
    }

    /// Flip the direction of every term, secondary keys included
    pub fn reversed(&self) -> Self {
        Self {
            terms: self
                .terms
                .iter()
                .map(|t| SortTerm {
                    key: t.key,
                    ascending: !t.ascending,
                })
                .collect(),
        }
    }

    pub fn terms(&self) -> &[SortTerm] {
        &self.terms
    }

    /// Compile this order with a backend's sort builder
    pub fn build<B: SortBuilder>(&self, builder: &B) -> B::Sort {
        builder.combine(
            self.terms
                .iter()
                .map(|t| builder.key(t.key, t.ascending))
                .collect(),
        )
    }
}

/// Compiles sort orders into a backend's native representation
pub trait SortBuilder {
    type Sort;

    fn key(&self, key: SortKey, ascending: bool) -> Self::Sort;

    /// Combine per-key sorts, most significant first
    fn combine(&self, sorts: Vec<Self::Sort>) -> Self::Sort;
}

/// Sort builder that emits the exact inverse of the wrapped builder's order
pub struct Reverse<'a, B: SortBuilder>(pub &'a B);

impl<B: SortBuilder> SortBuilder for Reverse<'_, B> {
    type Sort = B::Sort;

    fn key(&self, key: SortKey, ascending: bool) -> Self::Sort {
        self.0.key(key, !ascending)
    }

    fn combine(&self, sorts: Vec<Self::Sort>) -> Self::Sort {
        self.0.combine(sorts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Render;

    impl SortBuilder for Render {
        type Sort = String;

        fn key(&self, key: SortKey, ascending: bool) -> String {
            format!("{:?} {}", key, if ascending { "ASC" } else { "DESC" })
        }

        fn combine(&self, sorts: Vec<String>) -> String {
            sorts.join(", ")
        }
    }

    fn order() -> SortOrder {
        SortOrder::new()
            .ascending(SortKey::EntityId)
            .descending(SortKey::EntityVersion)
            .ascending(SortKey::Sequence)
    }

    #[test]
    fn test_reverse_flips_every_key() {
        assert_eq!(
            order().build(&Reverse(&Render)),
            "EntityId DESC, EntityVersion ASC, Sequence DESC"
        );
    }

    #[test]
    fn test_double_reverse_is_identity() {
        assert_eq!(order().build(&Reverse(&Reverse(&Render))), order().build(&Render));
        assert_eq!(order().reversed().reversed(), order());
    }

    #[test]
    fn test_reversed_order_matches_reverse_builder() {
        assert_eq!(order().reversed().build(&Render), order().build(&Reverse(&Render)));
    }
}
