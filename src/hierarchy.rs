//! Manager/reportee hierarchy.
//!
//! The whole employee table is loaded once into an [`OrgChart`] and every
//! question (direct reports, full subtree, tree for display) is answered from
//! that in-memory adjacency index. Traversals keep a visited set, so corrupted
//! data with manager cycles still terminates; the closing edge is treated as
//! absent and reported as an [`IntegrityFault`].

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::Serialize;
use sqlx::{Executor, Sqlite};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};
use crate::integrity::IntegrityFault;
use crate::models::employee::Employee;

/// Result of a downward traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtree {
    pub members: BTreeSet<i64>,
    pub faults: Vec<IntegrityFault>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HierarchyNode {
    pub id: i64,
    pub name: String,
    pub department_id: i64,
    pub role_id: Option<i64>,
    pub is_active: bool,
    pub children: Vec<HierarchyNode>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct HierarchyTree {
    pub roots: Vec<HierarchyNode>,
    pub faults: Vec<IntegrityFault>,
}

impl HierarchyTree {
    /// Number of employees placed in the tree.
    pub fn len(&self) -> usize {
        fn count(node: &HierarchyNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Drop every node for which `keep` is false. Kept employees below a dropped
    /// node become roots of their own, so nobody visible falls out of the tree.
    pub fn restrict(&mut self, keep: impl Fn(i64) -> bool) {
        fn split(
            mut node: HierarchyNode,
            keep: &dyn Fn(i64) -> bool,
            roots: &mut Vec<HierarchyNode>,
        ) -> Option<HierarchyNode> {
            let children = std::mem::take(&mut node.children);
            if keep(node.id) {
                node.children = children.into_iter().filter_map(|c| split(c, keep, roots)).collect();
                Some(node)
            } else {
                for child in children {
                    if let Some(lifted) = split(child, keep, roots) {
                        roots.push(lifted);
                    }
                }
                None
            }
        }

        let mut roots = Vec::with_capacity(self.roots.len());
        for root in std::mem::take(&mut self.roots) {
            if let Some(kept) = split(root, &keep, &mut roots) {
                roots.push(kept);
            }
        }
        self.roots = roots;
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrgChart {
    employees: BTreeMap<i64, Employee>,
    reports: BTreeMap<i64, Vec<i64>>,
}

impl OrgChart {
    pub fn from_employees(employees: impl IntoIterator<Item = Employee>) -> Self {
        let employees: BTreeMap<i64, Employee> = employees.into_iter().map(|e| (e.id, e)).collect();

        let mut reports: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        // BTreeMap iteration keeps each report list sorted by id.
        for employee in employees.values() {
            if let Some(manager_id) = employee.manager_id {
                reports.entry(manager_id).or_default().push(employee.id);
            }
        }

        Self { employees, reports }
    }

    /// One query for the whole table; inactive employees are kept so that
    /// reporting lines running through them stay intact.
    pub async fn load<'e, E>(executor: E) -> AppResult<Self>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, Employee>(
            "SELECT id, name, email, department_id, manager_id, role_id, is_active FROM employees",
        )
        .fetch_all(executor)
        .await?;

        tracing::debug!(employees = rows.len(), "org chart loaded");
        Ok(Self::from_employees(rows))
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    pub fn get(&self, employee_id: i64) -> Option<&Employee> {
        self.employees.get(&employee_id)
    }

    pub fn contains(&self, employee_id: i64) -> bool {
        self.employees.contains_key(&employee_id)
    }

    pub fn department_of(&self, employee_id: i64) -> Option<i64> {
        self.employees.get(&employee_id).map(|e| e.department_id)
    }

    pub fn direct_reports(&self, employee_id: i64) -> BTreeSet<i64> {
        self.children(employee_id).iter().copied().collect()
    }

    /// Every employee below `employee_id`, never including `employee_id` itself.
    pub fn transitive_reports(&self, employee_id: i64) -> Subtree {
        let mut visited: HashSet<i64> = HashSet::from([employee_id]);
        let mut subtree = Subtree::default();
        let mut queue: VecDeque<(i64, i64)> =
            self.children(employee_id).iter().map(|&c| (employee_id, c)).collect();

        while let Some((manager_id, id)) = queue.pop_front() {
            // Each employee has one manager, so a second visit can only come from a cycle.
            if !visited.insert(id) {
                subtree.faults.push(IntegrityFault::cycle(manager_id, id));
                continue;
            }
            subtree.members.insert(id);
            queue.extend(self.children(id).iter().map(|&c| (id, c)));
        }

        subtree
    }

    /// `employee_id` plus all transitive reports.
    pub fn team(&self, employee_id: i64) -> Subtree {
        let mut subtree = self.transitive_reports(employee_id);
        subtree.members.insert(employee_id);
        subtree
    }

    pub fn department_members(&self, department_id: i64) -> BTreeSet<i64> {
        self.employees
            .values()
            .filter(|e| e.department_id == department_id)
            .map(|e| e.id)
            .collect()
    }

    /// Managers above `employee_id`, nearest first.
    pub fn chain_of_command(&self, employee_id: i64) -> (Vec<i64>, Vec<IntegrityFault>) {
        let mut chain = Vec::new();
        let mut faults = Vec::new();
        let mut seen: HashSet<i64> = HashSet::from([employee_id]);
        let mut current = employee_id;

        while let Some(manager_id) = self.employees.get(&current).and_then(|e| e.manager_id) {
            if !self.employees.contains_key(&manager_id) {
                faults.push(IntegrityFault::dangling_manager(current, manager_id));
                break;
            }
            if !seen.insert(manager_id) {
                faults.push(IntegrityFault::cycle(manager_id, current));
                break;
            }
            chain.push(manager_id);
            current = manager_id;
        }

        (chain, faults)
    }

    /// Whether setting `employee_id`'s manager to `new_manager_id` would close a loop.
    pub fn would_create_cycle(&self, employee_id: i64, new_manager_id: i64) -> bool {
        if employee_id == new_manager_id {
            return true;
        }
        if self.chain_of_command(new_manager_id).0.contains(&employee_id) {
            return true;
        }
        // A pre-existing cycle above the new manager that includes the employee is
        // only visible from the employee's side.
        self.transitive_reports(employee_id).members.contains(&new_manager_id)
    }

    /// Tree rooted at `root`, or the whole forest when `root` is `None`.
    pub fn build_tree(&self, root: Option<i64>) -> AppResult<HierarchyTree> {
        let mut visited = HashSet::new();
        let mut tree = HierarchyTree::default();

        match root {
            Some(root_id) => {
                if !self.contains(root_id) {
                    return Err(AppError::not_found(format!("employee {root_id} not found")));
                }
                let node = self.subtree_node(root_id, &mut visited, &mut tree.faults);
                tree.roots.extend(node);
            }
            None => {
                for employee in self.employees.values() {
                    match employee.manager_id {
                        None => {}
                        Some(manager_id) if !self.contains(manager_id) => {
                            tree.faults.push(IntegrityFault::dangling_manager(employee.id, manager_id));
                        }
                        Some(_) => continue,
                    }
                    let node = self.subtree_node(employee.id, &mut visited, &mut tree.faults);
                    tree.roots.extend(node);
                }

                // Whatever is left hangs off a loop with no top. Cut each loop at its
                // lowest id so those employees still appear once.
                let stranded: Vec<i64> = self
                    .employees
                    .keys()
                    .copied()
                    .filter(|id| !visited.contains(id))
                    .collect();
                for id in stranded {
                    if visited.contains(&id) {
                        continue;
                    }
                    // The loop edge back into `start` is reported by the traversal.
                    let start = self.cycle_entry(id);
                    let node = self.subtree_node(start, &mut visited, &mut tree.faults);
                    tree.roots.extend(node);
                }
            }
        }

        Ok(tree)
    }

    /// Every distinct manager cycle, each listed from its lowest id upward.
    pub fn detect_cycles(&self) -> Vec<Vec<i64>> {
        let mut done: HashSet<i64> = HashSet::new();
        let mut cycles = Vec::new();

        for &start in self.employees.keys() {
            if done.contains(&start) {
                continue;
            }
            let mut path: Vec<i64> = Vec::new();
            let mut on_path: HashSet<i64> = HashSet::new();
            let mut current = Some(start);

            while let Some(id) = current {
                if done.contains(&id) || !self.employees.contains_key(&id) {
                    break;
                }
                if !on_path.insert(id) {
                    let pos = path.iter().position(|&p| p == id).unwrap_or(0);
                    let mut cycle = path[pos..].to_vec();
                    let min_pos = cycle
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, v)| **v)
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    cycle.rotate_left(min_pos);
                    cycles.push(cycle);
                    break;
                }
                path.push(id);
                current = self.employees.get(&id).and_then(|e| e.manager_id);
            }

            done.extend(path);
        }

        cycles
    }

    fn children(&self, employee_id: i64) -> &[i64] {
        self.reports.get(&employee_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lowest id on the loop reached by walking up from `id`.
    fn cycle_entry(&self, id: i64) -> i64 {
        let mut seen = Vec::new();
        let mut current = id;
        loop {
            if let Some(pos) = seen.iter().position(|&s| s == current) {
                return seen[pos..].iter().copied().min().unwrap_or(current);
            }
            seen.push(current);
            match self.employees.get(&current).and_then(|e| e.manager_id) {
                Some(manager_id) if self.contains(manager_id) => current = manager_id,
                _ => return current,
            }
        }
    }

    fn subtree_node(
        &self,
        id: i64,
        visited: &mut HashSet<i64>,
        faults: &mut Vec<IntegrityFault>,
    ) -> Option<HierarchyNode> {
        let employee = self.employees.get(&id)?;
        if !visited.insert(id) {
            return None;
        }

        let mut children = Vec::new();
        for &child in self.children(id) {
            if visited.contains(&child) {
                faults.push(IntegrityFault::cycle(id, child));
                continue;
            }
            children.extend(self.subtree_node(child, visited, faults));
        }

        Some(HierarchyNode {
            id,
            name: employee.name.clone(),
            department_id: employee.department_id,
            role_id: employee.role_id,
            is_active: employee.is_active,
            children,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::integrity::FaultKind;

    pub(crate) fn emp(id: i64, manager_id: Option<i64>, department_id: i64) -> Employee {
        Employee {
            id,
            name: format!("emp-{id}"),
            email: format!("emp{id}@example.com"),
            department_id,
            manager_id,
            role_id: None,
            is_active: true,
        }
    }

    /// 1 -> {2, 3}, 2 -> {4, 5}, 3 -> {6}, 5 -> {7}; 8 is a separate root.
    pub(crate) fn sample_chart() -> OrgChart {
        OrgChart::from_employees(vec![
            emp(1, None, 10),
            emp(2, Some(1), 10),
            emp(3, Some(1), 10),
            emp(4, Some(2), 10),
            emp(5, Some(2), 10),
            emp(6, Some(3), 10),
            emp(7, Some(5), 20),
            emp(8, None, 20),
        ])
    }

    fn set(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn restrict_lifts_visible_descendants_of_hidden_nodes() {
        let mut tree = sample_chart().build_tree(Some(1)).unwrap();
        tree.restrict(|id| id != 2);
        // 4 and 5 (with 7 below it) lose their manager and surface as roots.
        assert_eq!(tree.len(), 6);
        let mut roots: Vec<i64> = tree.roots.iter().map(|n| n.id).collect();
        roots.sort();
        assert_eq!(roots, vec![1, 4, 5]);

        let chart = sample_chart();
        let mut forest = chart.build_tree(None).unwrap();
        forest.restrict(|id| chart.department_of(id) == Some(20));
        let mut roots: Vec<i64> = forest.roots.iter().map(|n| n.id).collect();
        roots.sort();
        assert_eq!(roots, vec![7, 8]);
    }

    #[test]
    fn direct_reports_are_one_level() {
        let chart = sample_chart();
        assert_eq!(chart.direct_reports(1), set(&[2, 3]));
        assert_eq!(chart.direct_reports(4), set(&[]));
        assert_eq!(chart.direct_reports(999), set(&[]));
    }

    #[test]
    fn transitive_reports_cover_whole_subtree() {
        let chart = sample_chart();
        let subtree = chart.transitive_reports(1);
        assert_eq!(subtree.members, set(&[2, 3, 4, 5, 6, 7]));
        assert!(subtree.faults.is_empty());

        assert_eq!(chart.transitive_reports(2).members, set(&[4, 5, 7]));
        assert!(chart.transitive_reports(7).members.is_empty());
    }

    #[test]
    fn team_includes_self() {
        let chart = sample_chart();
        assert_eq!(chart.team(2).members, set(&[2, 4, 5, 7]));
        assert_eq!(chart.team(8).members, set(&[8]));
    }

    #[test]
    fn transitive_reports_terminate_on_cycle() {
        // 1 -> 2 -> 3 -> 1
        let chart = OrgChart::from_employees(vec![
            emp(1, Some(3), 10),
            emp(2, Some(1), 10),
            emp(3, Some(2), 10),
            emp(4, Some(3), 10),
        ]);

        let subtree = chart.transitive_reports(1);
        assert_eq!(subtree.members, set(&[2, 3, 4]));
        assert!(!subtree.members.contains(&1));
        assert_eq!(subtree.faults.len(), 1);
        assert_eq!(subtree.faults[0].kind, FaultKind::HierarchyCycle);
    }

    #[test]
    fn self_managed_employee_is_not_own_report() {
        let chart = OrgChart::from_employees(vec![emp(1, Some(1), 10)]);
        let subtree = chart.transitive_reports(1);
        assert!(subtree.members.is_empty());
        assert_eq!(subtree.faults.len(), 1);
    }

    #[test]
    fn team_grows_when_reports_added_at_any_depth() {
        let mut employees = vec![emp(1, None, 10), emp(2, Some(1), 10)];
        let mut previous = OrgChart::from_employees(employees.clone()).team(1).members;

        for (id, manager) in [(3, 2), (4, 3), (5, 1), (6, 4)] {
            employees.push(emp(id, Some(manager), 10));
            let current = OrgChart::from_employees(employees.clone()).team(1).members;
            assert!(current.is_superset(&previous));
            assert!(current.contains(&id));
            previous = current;
        }
    }

    #[test]
    fn would_create_cycle_detects_descendant_manager() {
        let chart = sample_chart();
        assert!(chart.would_create_cycle(2, 7));
        assert!(chart.would_create_cycle(1, 1));
        assert!(!chart.would_create_cycle(7, 8));
        assert!(!chart.would_create_cycle(3, 2));
    }

    #[test]
    fn chain_of_command_walks_up() {
        let chart = sample_chart();
        let (chain, faults) = chart.chain_of_command(7);
        assert_eq!(chain, vec![5, 2, 1]);
        assert!(faults.is_empty());
    }

    #[test]
    fn build_tree_from_root() {
        let chart = sample_chart();
        let tree = chart.build_tree(Some(2)).unwrap();
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.roots[0].id, 2);
        assert_eq!(tree.len(), 4);

        assert!(matches!(chart.build_tree(Some(42)), Err(AppError::NotFound(_))));
    }

    #[test]
    fn build_forest_places_everyone_once_even_with_cycles() {
        let chart = OrgChart::from_employees(vec![
            emp(1, None, 10),
            emp(2, Some(1), 10),
            // detached loop 5 -> 6 -> 5 with a hanger-on 7
            emp(5, Some(6), 10),
            emp(6, Some(5), 10),
            emp(7, Some(6), 10),
            // dangling manager reference
            emp(9, Some(404), 10),
        ]);

        let tree = chart.build_tree(None).unwrap();
        assert_eq!(tree.len(), 6);
        let root_ids: Vec<i64> = tree.roots.iter().map(|r| r.id).collect();
        assert_eq!(root_ids, vec![1, 9, 5]);
        assert!(tree.faults.iter().any(|f| f.kind == FaultKind::HierarchyCycle));
        assert!(tree.faults.iter().any(|f| f.kind == FaultKind::DanglingManager));
    }

    #[test]
    fn detect_cycles_reports_each_loop_once() {
        let chart = OrgChart::from_employees(vec![
            emp(1, Some(2), 10),
            emp(2, Some(1), 10),
            emp(3, Some(1), 10),
            emp(4, Some(6), 10),
            emp(5, Some(4), 10),
            emp(6, Some(5), 10),
            emp(7, None, 10),
        ]);

        let cycles = chart.detect_cycles();
        assert_eq!(cycles, vec![vec![1, 2], vec![4, 6, 5]]);
        assert!(sample_chart().detect_cycles().is_empty());
    }

    #[test]
    fn department_members_match_department_id() {
        let chart = sample_chart();
        assert_eq!(chart.department_members(20), set(&[7, 8]));
        assert_eq!(chart.department_of(7), Some(20));
    }
}
