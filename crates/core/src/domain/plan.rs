use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskEstimate {
    pub task_name: String,
    pub estimated_time_hours: f64,
    pub required_resources: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub milestone_name: String,
    /// Task names, matched by text only.
    pub tasks: Vec<String>,
}

/// Terminal artifact of a pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectPlan {
    pub tasks: Vec<TaskEstimate>,
    pub milestones: Vec<Milestone>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DanglingReference {
    pub milestone_name: String,
    pub task_name: String,
}

impl ProjectPlan {
    pub fn new(tasks: Vec<TaskEstimate>, milestones: Vec<Milestone>) -> Self {
        Self { tasks, milestones }
    }

    pub fn total_estimated_hours(&self) -> f64 {
        self.tasks.iter().map(|task| task.estimated_time_hours).sum()
    }

    /// Returns `None` when `hours_per_day` is not a positive number.
    pub fn estimated_days(&self, hours_per_day: f64) -> Option<f64> {
        if !(hours_per_day.is_finite() && hours_per_day > 0.0) {
            return None;
        }
        Some(self.total_estimated_hours() / hours_per_day)
    }

    /// Hours per resource label. A task requiring several resources credits its
    /// full estimate to each of them; duplicate labels within one task count once.
    pub fn resource_hours(&self) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for task in &self.tasks {
            let labels = task.required_resources.iter().collect::<BTreeSet<_>>();
            for label in labels {
                *totals.entry(label.clone()).or_insert(0.0) += task.estimated_time_hours;
            }
        }
        totals
    }

    /// Milestone entries that name a task absent from `tasks`.
    pub fn dangling_task_references(&self) -> Vec<DanglingReference> {
        let known = self.tasks.iter().map(|task| task.task_name.as_str()).collect::<BTreeSet<_>>();

        self.milestones
            .iter()
            .flat_map(|milestone| {
                milestone.tasks.iter().filter(|name| !known.contains(name.as_str())).map(|name| {
                    DanglingReference {
                        milestone_name: milestone.milestone_name.clone(),
                        task_name: name.clone(),
                    }
                })
            })
            .collect()
    }
}
