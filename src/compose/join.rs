//! Join node operator table.

use super::{components, pair_key};
use crate::model::{JoinTable, OperatorItem, TableOperator, TablePair};

impl JoinTable {
    /// Join over `subtables` with a cross join between adjacent tables.
    pub fn new(subtables: Vec<String>) -> Self {
        let mut join = JoinTable::default();
        join.set_subtables(subtables);
        join
    }

    pub fn subtables(&self) -> &[String] {
        &self.subtables
    }

    /// Operators in insertion order.
    pub fn operators(&self) -> impl Iterator<Item = (&TablePair, &TableOperator)> {
        self.operators.iter()
    }

    pub fn operator_pairs(&self) -> Vec<&TablePair> {
        self.operators.keys().collect()
    }

    /// Operators between `a` and `b`, in either orientation.
    pub fn operator(&self, a: &str, b: &str) -> Option<&TableOperator> {
        self.operators
            .iter()
            .find(|(pair, _)| pair.connects(a, b))
            .map(|(_, op)| op)
    }

    pub(crate) fn operator_mut(&mut self, a: &str, b: &str) -> Option<&mut TableOperator> {
        self.operators
            .iter_mut()
            .find(|(pair, _)| pair.connects(a, b))
            .map(|(_, op)| op)
    }

    /// Whether every sub-table is reachable from every other.
    pub fn is_connected(&self) -> bool {
        components(&self.subtables, &self.operators).len() <= 1
    }

    /// Replace the sub-tables; operators touching dropped tables go away and
    /// adjacent pairs without an operator get a cross join.
    pub fn set_subtables(&mut self, subtables: Vec<String>) {
        self.operators
            .retain(|pair, _| subtables.contains(&pair.left) && subtables.contains(&pair.right));
        for window in subtables.windows(2) {
            let (left, right) = (&window[0], &window[1]);
            if pair_key(&self.operators, left, right).is_none() {
                self.operators.insert(
                    TablePair::new(left.clone(), right.clone()),
                    TableOperator::single(OperatorItem::cross()),
                );
            }
        }
        self.subtables = subtables;
    }

    /// Remove a sub-table and its operators, reconnecting what it held
    /// together with cross joins.
    pub fn remove_subtable(&mut self, name: &str) -> bool {
        let Some(pos) = self.subtables.iter().position(|t| t == name) else {
            return false;
        };
        self.subtables.remove(pos);
        self.operators.retain(|pair, _| !pair.involves(name));
        self.reconnect();
        true
    }

    /// Remove the operators between `left` and `right`. A join node is never
    /// removable this way: if the pair ends up disconnected a cross join is
    /// synthesized in place.
    pub(crate) fn remove_pair(&mut self, left: &str, right: &str) -> bool {
        let Some(key) = pair_key(&self.operators, left, right) else {
            return false;
        };
        self.operators.shift_remove(&key);

        let connected = components(&self.subtables, &self.operators)
            .iter()
            .any(|group| group.iter().any(|t| t == left) && group.iter().any(|t| t == right));
        if !connected {
            tracing::debug!(left, right, "synthesized cross join after operator removal");
            self.operators
                .insert(key, TableOperator::single(OperatorItem::cross()));
        }
        false
    }

    /// Cross-join adjacent tables that ended up in different components.
    fn reconnect(&mut self) {
        loop {
            let groups = components(&self.subtables, &self.operators);
            if groups.len() <= 1 {
                return;
            }
            let group_of = |t: &String| groups.iter().position(|g| g.contains(t));
            let Some(window) = self
                .subtables
                .windows(2)
                .find(|w| group_of(&w[0]) != group_of(&w[1]))
            else {
                return;
            };
            let pair = TablePair::new(window[0].clone(), window[1].clone());
            self.operators
                .insert(pair, TableOperator::single(OperatorItem::cross()));
        }
    }
}
