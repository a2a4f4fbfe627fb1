//! Owner-scoped access to the recipe tables.
//!
//! Every read and write goes through an [`OwnerScope`] built from the caller,
//! so a row owned by someone else looks exactly like a row that does not
//! exist.

use crate::models::EntityId;
use crate::user_models::UserId;

pub trait OwnedResource {
    fn id(&self) -> EntityId;

    fn owner(&self) -> UserId;

    fn scope(caller: UserId) -> OwnerScope
    where
        Self: Sized,
    {
        OwnerScope::new(caller)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerScope {
    owner: UserId,
}

impl OwnerScope {
    pub fn new(owner: UserId) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn admits<R: OwnedResource>(&self, row: &R) -> bool {
        row.owner() == self.owner
    }

    pub fn filter<'a, R: OwnedResource>(&self, rows: &'a [R]) -> impl Iterator<Item = &'a R> + 'a {
        let scope = *self;
        rows.iter().filter(move |row| scope.admits(*row))
    }

    /// Looks `id` up among the caller's rows only.
    pub fn get<'a, R: OwnedResource>(&self, rows: &'a [R], id: EntityId) -> Option<&'a R> {
        self.filter(rows).find(|row| row.id() == id)
    }

    pub fn get_mut<'a, R: OwnedResource>(&self, rows: &'a mut [R], id: EntityId) -> Option<&'a mut R> {
        rows.iter_mut()
            .find(|row| row.owner() == self.owner && row.id() == id)
    }

    pub fn position<R: OwnedResource>(&self, rows: &[R], id: EntityId) -> Option<usize> {
        rows.iter()
            .position(|row| row.owner() == self.owner && row.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        id: EntityId,
        owner: UserId,
    }

    impl OwnedResource for Row {
        fn id(&self) -> EntityId {
            self.id
        }

        fn owner(&self) -> UserId {
            self.owner
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { id: 1, owner: 10 },
            Row { id: 2, owner: 20 },
            Row { id: 3, owner: 10 },
        ]
    }

    #[test]
    fn test_filter_keeps_only_owned_rows() {
        let rows = rows();
        let ids: Vec<_> = Row::scope(10).filter(&rows).map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_foreign_row_is_invisible() {
        let mut rows = rows();
        let scope = Row::scope(10);
        assert!(scope.get(&rows, 2).is_none());
        assert!(scope.get_mut(&mut rows, 2).is_none());
        assert!(scope.position(&rows, 2).is_none());
        assert_eq!(scope.position(&rows, 3), Some(2));
    }
}
