use crate::memory::Reservation;
use crate::SubjectId;
use std::collections::BTreeMap;
use std::fmt;

struct Subscription {
    extent: usize,
    _reservation: Reservation,
}

/// Set of subscribed subjects with the payload extent kept for each
#[derive(Default)]
pub struct SubjectFilter {
    subjects: BTreeMap<SubjectId, Subscription>,
}

impl SubjectFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subject. The reservation is held until the subject is removed.
    /// Returns `false` if the subject was already present.
    pub fn insert(&mut self, subject: SubjectId, extent: usize, reservation: Reservation) -> bool {
        if self.subjects.contains_key(&subject) {
            return false;
        }
        self.subjects.insert(
            subject,
            Subscription {
                extent,
                _reservation: reservation,
            },
        );
        true
    }

    pub fn remove(&mut self, subject: SubjectId) -> bool {
        self.subjects.remove(&subject).is_some()
    }

    pub fn contains(&self, subject: SubjectId) -> bool {
        self.subjects.contains_key(&subject)
    }

    /// Extent of a subscribed subject, `None` if the subject is filtered out
    pub fn matches(&self, subject: SubjectId) -> Option<usize> {
        self.subjects.get(&subject).map(|subscription| subscription.extent)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn subjects(&self) -> impl Iterator<Item = SubjectId> + '_ {
        self.subjects.keys().copied()
    }
}

impl fmt::Debug for SubjectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.subjects.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryResource;

    fn subject(value: u16) -> SubjectId {
        SubjectId::new(value).unwrap()
    }

    #[test]
    fn test_exact_match() {
        let memory = MemoryResource::unbounded();
        let mut filter = SubjectFilter::new();
        assert!(filter.insert(subject(1000), 16, memory.reserve(16).unwrap()));

        assert_eq!(filter.matches(subject(1000)), Some(16));
        assert_eq!(filter.matches(subject(1001)), None);
    }

    #[test]
    fn test_duplicate_insert_keeps_first() {
        let memory = MemoryResource::new(64);
        let mut filter = SubjectFilter::new();
        assert!(filter.insert(subject(7), 16, memory.reserve(16).unwrap()));
        assert!(!filter.insert(subject(7), 32, memory.reserve(32).unwrap()));

        assert_eq!(filter.len(), 1);
        assert_eq!(filter.matches(subject(7)), Some(16));
        assert_eq!(memory.used(), 16);
    }

    #[test]
    fn test_remove_releases_memory() {
        let memory = MemoryResource::new(64);
        let mut filter = SubjectFilter::new();
        filter.insert(subject(1), 64, memory.reserve(64).unwrap());
        assert_eq!(memory.available(), 0);

        assert!(filter.remove(subject(1)));
        assert!(!filter.remove(subject(1)));
        assert!(filter.is_empty());
        assert_eq!(memory.available(), 64);
    }

    #[test]
    fn test_subjects_sorted() {
        let memory = MemoryResource::unbounded();
        let mut filter = SubjectFilter::new();
        for value in [30, 10, 20] {
            filter.insert(subject(value), 8, memory.reserve(8).unwrap());
        }
        let subjects: Vec<u16> = filter.subjects().map(SubjectId::into_u16).collect();
        assert_eq!(subjects, vec![10, 20, 30]);
        assert!(filter.contains(subject(20)));
    }
}
