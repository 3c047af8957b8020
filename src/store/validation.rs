use std::collections::HashSet;

use crate::model::Project;

/// Structural problems in `project`, in object order. Each distinct message appears once.
pub fn validate(project: &Project) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for entity in project.objects() {
        let name = entity.name.as_str();
        if !seen.insert(name) {
            push_unique(&mut errors, format!("duplicate name: `{name}`"));
        }
        if name.trim().is_empty() {
            push_unique(&mut errors, format!("empty name on {} object", entity.kind()));
        }
    }

    errors
}

fn push_unique(errors: &mut Vec<String>, message: String) {
    if !errors.contains(&message) {
        errors.push(message);
    }
}
