//! Graphviz export of a resolved task list.

use std::fmt::Write;

use crate::resolver::TaskList;

const TEST_COLOR: &str = "#40E0D0";
const BUILD_COLOR: &str = "#FF8C00";
const LINT_COLOR: &str = "#9370DB";
const DOC_COLOR: &str = "#48D1CC";
const ROTATING: [&str; 4] = ["#C71585", "#8A2BE2", "#4682B4", "#DAA520"];

/// Color for a task, from its base name.
fn task_color(task: &str, rotation: &mut usize) -> &'static str {
    if task.contains("test") {
        TEST_COLOR
    } else if task.contains("build") {
        BUILD_COLOR
    } else if task.contains("format") || task.contains("lint") {
        LINT_COLOR
    } else if task.contains("doc") {
        DOC_COLOR
    } else {
        let color = ROTATING[*rotation % ROTATING.len()];
        *rotation += 1;
        color
    }
}

fn quoted(id: &str) -> String {
    format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render `tasks` as a DOT digraph: edges point from a task to its
/// dependencies, and dependency-free tasks share a rank.
pub fn to_dot(tasks: &TaskList) -> String {
    let mut out = String::from("digraph tasks {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, style=\"rounded,filled\", fontname=\"Helvetica\"];\n");

    let mut rotation = 0;
    for task in tasks.iter() {
        let name = task.name.to_string();
        let color = task_color(&task.name.task, &mut rotation);
        let _ = writeln!(out, "  {} [fillcolor=\"{}\"];", quoted(&name), color);
    }

    let mut leaves = Vec::new();
    for name in tasks.names() {
        let mut has_deps = false;
        for dep in tasks.dependencies_of(name) {
            has_deps = true;
            let _ = writeln!(out, "  {} -> {};", quoted(name), quoted(dep));
        }
        if !has_deps {
            leaves.push(quoted(name));
        }
    }

    if !leaves.is_empty() {
        let _ = writeln!(out, "  {{ rank=same; {}; }}", leaves.join("; "));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::tasks::parse_tasks_config;
    use crate::pipeline::Pipeline;
    use crate::projects::ProjectRegistry;
    use crate::resolver::{filter_projects, Resolver};
    use std::path::Path;

    #[test]
    fn renders_nodes_edges_and_rank() {
        let mut registry = ProjectRegistry::new();
        registry.add("apps/a", "internal").unwrap();
        let raw = parse_tasks_config(
            "build:\n  cmd: [make]\n  depends_on: [test, codegen]\ntest:\n  cmd: [\"true\"]\ncodegen:\n  cmd: [gen]\n",
        )
        .unwrap();
        let pipeline = Pipeline::standardize(&raw, &registry).unwrap();
        let projects = filter_projects(&registry, &[], false).unwrap();
        let list = Resolver::new(&pipeline, &registry, Path::new("."))
            .resolve(&["build".to_string()], &projects)
            .unwrap();

        let dot = to_dot(&list);
        assert!(dot.starts_with("digraph tasks {\n"));
        assert!(dot.contains("\"apps/a#build\" [fillcolor=\"#FF8C00\"];"));
        assert!(dot.contains("\"apps/a#test\" [fillcolor=\"#40E0D0\"];"));
        assert!(dot.contains("\"apps/a#codegen\" [fillcolor=\"#C71585\"];"));
        assert!(dot.contains("\"apps/a#build\" -> \"apps/a#codegen\";"));
        assert!(dot.contains("\"apps/a#build\" -> \"apps/a#test\";"));
        assert!(dot.contains("{ rank=same; \"apps/a#codegen\"; \"apps/a#test\"; }"));
        assert!(dot.ends_with("}\n"));
    }
}
