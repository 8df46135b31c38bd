//! Ordering of the data section.
//!
//! The collect pass registers items class by class, and each data section is written in
//! registration order. A [`MixedSectionLayoutStrategy`] decides in which order the classes are
//! visited, which is what places related items next to each other.

use std::collections::HashMap;

use crate::model::class::ClassRc;

/// Chooses the order in which the classes of a file populate the data section.
pub trait MixedSectionLayoutStrategy: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// The classes of one file in the order their items should be laid out.
    ///
    /// `classes` is in class definition order.
    fn collection_order(&self, classes: &[ClassRc]) -> Vec<ClassRc>;
}

/// Lays items out in class definition order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLayoutStrategy;

impl MixedSectionLayoutStrategy for DefaultLayoutStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn collection_order(&self, classes: &[ClassRc]) -> Vec<ClassRc> {
        classes.to_vec()
    }
}

/// Lays out the items of startup classes first, in startup order.
///
/// Items only reachable from other classes follow in class definition order. An item shared by
/// a startup class and a later class is placed with the startup class.
#[derive(Debug, Clone, Default)]
pub struct StartupLayoutStrategy {
    rank: HashMap<String, usize>,
}

impl StartupLayoutStrategy {
    /// Create a strategy for the given class descriptors, in startup order.
    #[must_use]
    pub fn new(startup_classes: &[String]) -> StartupLayoutStrategy {
        let mut rank = HashMap::with_capacity(startup_classes.len());
        for (index, descriptor) in startup_classes.iter().enumerate() {
            rank.entry(descriptor.clone()).or_insert(index);
        }
        StartupLayoutStrategy { rank }
    }
}

impl MixedSectionLayoutStrategy for StartupLayoutStrategy {
    fn name(&self) -> &'static str {
        "startup"
    }

    fn collection_order(&self, classes: &[ClassRc]) -> Vec<ClassRc> {
        let mut startup: Vec<(usize, ClassRc)> = Vec::new();
        let mut rest = Vec::with_capacity(classes.len());
        for class in classes {
            match self.rank.get(&class.descriptor()) {
                Some(rank) => startup.push((*rank, class.clone())),
                None => rest.push(class.clone()),
            }
        }
        startup.sort_by_key(|(rank, _)| *rank);
        startup
            .into_iter()
            .map(|(_, class)| class)
            .chain(rest)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{class::DexProgramClass, AccessFlags, ItemFactory};

    #[test]
    fn test_startup_classes_first() {
        let factory = ItemFactory::new();
        let classes: Vec<ClassRc> = ["LA;", "LB;", "LC;", "LD;"]
            .iter()
            .map(|descriptor| {
                Arc::new(DexProgramClass::new(
                    factory.create_type(descriptor),
                    AccessFlags::PUBLIC,
                    None,
                ))
            })
            .collect();

        let strategy = StartupLayoutStrategy::new(&["LD;".to_string(), "LB;".to_string()]);
        let order: Vec<String> = strategy
            .collection_order(&classes)
            .iter()
            .map(|class| class.descriptor())
            .collect();
        assert_eq!(order, ["LD;", "LB;", "LA;", "LC;"]);

        let order = DefaultLayoutStrategy.collection_order(&classes);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0].descriptor(), "LA;");
    }
}
