//! Hand-curated field groupings for known task types.
//!
//! Structural header fields come first so that later, content-heavy groups are
//! generated with them already in context.

/// One group of a predefined plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredefinedGroup {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub max_tokens: usize,
}

/// A fixed chunk layout for one task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredefinedPlan {
    pub task_type: &'static str,
    pub root_key: &'static str,
    pub groups: &'static [PredefinedGroup],
    /// Expected output size used for auto-detection when the caller gives none.
    pub default_expected_tokens: usize,
}

impl PredefinedPlan {
    /// All field names across groups, in plan order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.groups
            .iter()
            .flat_map(|g| g.fields.iter().copied())
            .collect()
    }
}

const PPT_GENERATION: PredefinedPlan = PredefinedPlan {
    task_type: "ppt_generation",
    root_key: "pptTemplate2Vm",
    default_expected_tokens: 10_000,
    groups: &[
        PredefinedGroup {
            name: "basic_info",
            fields: &["title", "patient", "diag"],
            max_tokens: 1_000,
        },
        PredefinedGroup {
            name: "treatment",
            fields: &["treatments", "medications", "surgeries"],
            max_tokens: 3_000,
        },
        PredefinedGroup {
            name: "examination",
            fields: &["examinations", "lab_tests", "vital_signs"],
            max_tokens: 3_000,
        },
        PredefinedGroup {
            name: "imaging",
            fields: &["images", "medical_images", "scans"],
            max_tokens: 2_000,
        },
        PredefinedGroup {
            name: "timeline_and_charts",
            fields: &["timeline", "events", "indicators", "gantt", "charts"],
            max_tokens: 2_000,
        },
    ],
};

const PATIENT_STRUCTURING: PredefinedPlan = PredefinedPlan {
    task_type: "patient_structuring",
    root_key: "patient_structured_data",
    default_expected_tokens: 8_000,
    groups: &[
        PredefinedGroup {
            name: "basic_info",
            fields: &["patient_info", "demographics", "contact"],
            max_tokens: 500,
        },
        PredefinedGroup {
            name: "diagnosis",
            fields: &["diagnoses", "chief_complaint", "present_illness"],
            max_tokens: 2_000,
        },
        PredefinedGroup {
            name: "medication",
            fields: &["medications", "allergies", "adverse_reactions"],
            max_tokens: 2_000,
        },
        PredefinedGroup {
            name: "tests_and_exams",
            fields: &["lab_tests", "examinations", "imaging_studies"],
            max_tokens: 3_000,
        },
        PredefinedGroup {
            name: "treatment_records",
            fields: &["treatments", "procedures", "surgeries"],
            max_tokens: 3_000,
        },
        PredefinedGroup {
            name: "history_and_follow_up",
            fields: &["medical_history", "family_history", "follow_ups"],
            max_tokens: 2_000,
        },
    ],
};

const PREDEFINED_PLANS: &[PredefinedPlan] = &[PPT_GENERATION, PATIENT_STRUCTURING];

/// Expected output size for tasks without a predefined plan.
pub const DEFAULT_EXPECTED_TOKENS: usize = 5_000;

/// Look up the predefined plan for a task type.
pub fn predefined_plan(task_type: &str) -> Option<&'static PredefinedPlan> {
    PREDEFINED_PLANS.iter().find(|p| p.task_type == task_type)
}

/// Task types that have a predefined plan.
pub fn known_task_types() -> Vec<&'static str> {
    PREDEFINED_PLANS.iter().map(|p| p.task_type).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup() {
        let plan = predefined_plan("ppt_generation").unwrap();
        assert_eq!(plan.root_key, "pptTemplate2Vm");
        assert_eq!(plan.groups.len(), 5);
        assert_eq!(plan.groups[0].max_tokens, 1_000);

        let plan = predefined_plan("patient_structuring").unwrap();
        assert_eq!(plan.groups.len(), 6);
        assert_eq!(plan.groups[0].max_tokens, 500);

        assert!(predefined_plan("discharge_summary").is_none());
        assert_eq!(known_task_types(), vec!["ppt_generation", "patient_structuring"]);
    }

    #[test]
    fn test_groups_never_share_fields() {
        for plan in PREDEFINED_PLANS {
            let names = plan.field_names();
            let unique: HashSet<_> = names.iter().collect();
            assert_eq!(names.len(), unique.len(), "{} repeats a field", plan.task_type);
        }
    }
}
