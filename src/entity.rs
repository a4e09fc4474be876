//! Entity ids and the arenas they index.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

pub trait EntityRef: Clone + Copy + PartialEq + Eq + PartialOrd + Ord + Hash {
    fn new(value: usize) -> Self;
    fn index(self) -> usize;
    fn invalid() -> Self;
    fn is_invalid(self) -> bool {
        self == Self::invalid()
    }
}

/// `entity!(Block, "block")` declares `Block`, printed as `block3`.
#[macro_export]
macro_rules! entity {
    ($name:tt, $prefix:tt) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $crate::entity::EntityRef for $name {
            fn new(value: usize) -> Self {
                use std::convert::TryFrom;
                match u32::try_from(value) {
                    Ok(value) if value != u32::MAX => Self(value),
                    _ => panic!("{} index {} out of range", $prefix, value),
                }
            }
            fn index(self) -> usize {
                self.0 as usize
            }
            fn invalid() -> Self {
                Self(u32::MAX)
            }
        }

        impl $name {
            pub const PREFIX: &'static str = $prefix;
        }

        impl std::default::Default for $name {
            fn default() -> Self {
                <Self as $crate::entity::EntityRef>::invalid()
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Display::fmt(self, f)
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                if <Self as $crate::entity::EntityRef>::is_invalid(*self) {
                    write!(f, "{}?", $prefix)
                } else {
                    write!(f, "{}{}", $prefix, self.0)
                }
            }
        }
    };
}

#[derive(Clone, Debug)]
pub struct EntityVec<Idx: EntityRef, T: Clone + Debug> {
    items: Vec<T>,
    _idx: PhantomData<Idx>,
}

impl<Idx: EntityRef, T: Clone + Debug> Default for EntityVec<Idx, T> {
    fn default() -> Self {
        EntityVec {
            items: vec![],
            _idx: PhantomData,
        }
    }
}

impl<Idx: EntityRef, T: Clone + Debug> EntityVec<Idx, T> {
    pub fn push(&mut self, t: T) -> Idx {
        let idx = Idx::new(self.items.len());
        self.items.push(t);
        idx
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All ids in order. Does not borrow `self`, so callers may mutate
    /// elements while walking it.
    pub fn iter(&self) -> impl Iterator<Item = Idx> {
        (0..self.items.len()).map(Idx::new)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Idx, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, t)| (Idx::new(index), t))
    }

    /// The lowest id whose element satisfies `pred`.
    pub fn position<F: FnMut(&T) -> bool>(&self, pred: F) -> Option<Idx> {
        self.items.iter().position(pred).map(Idx::new)
    }

    pub fn get(&self, idx: Idx) -> Option<&T> {
        self.items.get(idx.index())
    }
}

impl<Idx: EntityRef, T: Clone + Debug> Index<Idx> for EntityVec<Idx, T> {
    type Output = T;
    fn index(&self, idx: Idx) -> &T {
        &self.items[idx.index()]
    }
}

impl<Idx: EntityRef, T: Clone + Debug> IndexMut<Idx> for EntityVec<Idx, T> {
    fn index_mut(&mut self, idx: Idx) -> &mut T {
        &mut self.items[idx.index()]
    }
}

/// Side table keyed by entity; unset entries read as `T::default()`.
#[derive(Clone, Debug, Default)]
pub struct PerEntity<Idx: EntityRef, T: Clone + Debug + Default> {
    items: Vec<T>,
    default: T,
    _idx: PhantomData<Idx>,
}

impl<Idx: EntityRef, T: Clone + Debug + Default> Index<Idx> for PerEntity<Idx, T> {
    type Output = T;
    fn index(&self, idx: Idx) -> &T {
        self.items.get(idx.index()).unwrap_or(&self.default)
    }
}

impl<Idx: EntityRef, T: Clone + Debug + Default> IndexMut<Idx> for PerEntity<Idx, T> {
    fn index_mut(&mut self, idx: Idx) -> &mut T {
        if idx.index() >= self.items.len() {
            self.items.resize(idx.index() + 1, T::default());
        }
        &mut self.items[idx.index()]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    crate::entity!(Thing, "thing");

    #[test]
    fn push_returns_dense_indices() {
        let mut things: EntityVec<Thing, &str> = EntityVec::default();
        let a = things.push("a");
        let b = things.push("b");
        assert_eq!(a.index(), 0);
        assert_eq!(things[b], "b");
        assert_eq!(format!("{}", b), "thing1");
        assert_eq!(things.iter().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(things.position(|t| *t == "b"), Some(b));
        assert_eq!(things.position(|t| t.is_empty()), None);
    }

    #[test]
    fn per_entity_defaults_and_grows() {
        let mut side: PerEntity<Thing, u32> = PerEntity::default();
        assert_eq!(side[Thing::new(5)], 0);
        side[Thing::new(3)] = 7;
        assert_eq!(side[Thing::new(3)], 7);
        assert_eq!(side[Thing::new(2)], 0);
    }

    #[test]
    fn default_entity_is_invalid() {
        assert!(Thing::default().is_invalid());
        assert!(!Thing::new(0).is_invalid());
        assert_eq!(format!("{:?}", Thing::default()), "thing?");
    }
}
