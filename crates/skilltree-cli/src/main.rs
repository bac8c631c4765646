//! skilltree-admin CLI tool
//!
//! Inspects and maintains skill trees stored in a local RocksDB directory.
//!
//! Usage:
//!   skilltree-admin seed <tree> [title]
//!   skilltree-admin export <tree>
//!   skilltree-admin import <tree> <snapshot.json>
//!   skilltree-admin search <tree> <query>
//!   skilltree-admin check <tree>
//!   skilltree-admin apply <tree> <events.jsonl>

use skilltree_graph::{compute_search_info, seed_graph, GraphModel, GraphSnapshot, TreeId};
use skilltree_store::{load_snapshot, EdgeRow, NodeRow, RocksStorage, Storage, TreeRow};
use skilltree_sync::{ChangeEvent, StorageOp, SyncReconciler, DEFAULT_TREE_TITLE};
use std::error::Error;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Clone, PartialEq)]
enum AdminCommand {
    Seed { tree: TreeId, title: Option<String> },
    Export { tree: TreeId },
    Import { tree: TreeId, file: PathBuf },
    Search { tree: TreeId, query: String },
    Check { tree: TreeId },
    Apply { tree: TreeId, file: PathBuf },
    Help,
}

fn print_usage() {
    eprintln!("skilltree-admin - Inspect and maintain stored skill trees");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  skilltree-admin seed <tree> [title]           Reset a tree to the default template");
    eprintln!("  skilltree-admin export <tree>                 Print the tree as snapshot JSON");
    eprintln!("  skilltree-admin import <tree> <file>          Replace a tree from snapshot JSON");
    eprintln!("  skilltree-admin search <tree> <query>         Show matches and their prerequisites");
    eprintln!("  skilltree-admin check <tree>                  Audit acyclicity and unlock state");
    eprintln!("  skilltree-admin apply <tree> <events.jsonl>   Reconcile change events into a tree");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SKILLTREE_DATA_DIR  Storage directory (default: ./skilltree-data)");
    eprintln!("  RUST_LOG            Log filter (logs go to stderr)");
}

fn get_data_dir() -> PathBuf {
    std::env::var("SKILLTREE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./skilltree-data"))
}

fn parse_args(args: &[String]) -> Result<AdminCommand, String> {
    let Some(cmd) = args.get(1) else {
        return Err("missing command".to_string());
    };
    let arg = |index: usize, what: &str| -> Result<String, String> {
        args.get(index)
            .cloned()
            .ok_or_else(|| format!("{} requires a {} argument", cmd, what))
    };

    let command = match cmd.as_str() {
        "seed" => AdminCommand::Seed {
            tree: arg(2, "tree")?.into(),
            title: args.get(3).cloned(),
        },
        "export" => AdminCommand::Export {
            tree: arg(2, "tree")?.into(),
        },
        "import" => AdminCommand::Import {
            tree: arg(2, "tree")?.into(),
            file: arg(3, "file")?.into(),
        },
        "search" => AdminCommand::Search {
            tree: arg(2, "tree")?.into(),
            query: args[3.min(args.len())..].join(" "),
        },
        "check" => AdminCommand::Check {
            tree: arg(2, "tree")?.into(),
        },
        "apply" => AdminCommand::Apply {
            tree: arg(2, "tree")?.into(),
            file: arg(3, "file")?.into(),
        },
        "-h" | "--help" | "help" => AdminCommand::Help,
        other => return Err(format!("Unknown command: {}", other)),
    };
    Ok(command)
}

/// Load a tree's rows into a model, warning about rows that break invariants.
fn load_model(storage: &dyn Storage, tree: &TreeId) -> CliResult<GraphModel> {
    let (model, report) = GraphModel::import(load_snapshot(storage, tree)?);
    for (edge, err) in &report.rejected_edges {
        warn!(edge = %edge, "{}", err);
    }
    Ok(model)
}

/// Overwrite every row of `tree` with `model`, creating the tree row if needed.
fn store_model(storage: &dyn Storage, tree: &TreeId, model: &GraphModel, title: Option<String>) -> CliResult<()> {
    let existing = storage.get_tree(tree)?;
    if existing.is_none() || title.is_some() {
        storage.put_tree(&TreeRow {
            id: tree.clone(),
            title: title.unwrap_or_else(|| DEFAULT_TREE_TITLE.to_string()),
            password_protected: existing.is_some_and(|row| row.password_protected),
        })?;
    }

    let op = StorageOp::ReplaceTree {
        nodes: model.nodes().map(|n| NodeRow::from_node(tree, n)).collect(),
        edges: model.edges().map(|e| EdgeRow::from_edge(tree, e)).collect(),
    };
    op.execute(storage, tree)?;
    Ok(())
}

/// Run one command. Returns false when the command found a problem.
fn run(command: AdminCommand, storage: &dyn Storage, out: &mut dyn Write) -> CliResult<bool> {
    match command {
        AdminCommand::Seed { tree, title } => {
            let (model, _) = GraphModel::import(seed_graph());
            store_model(storage, &tree, &model, title)?;
            info!(tree = %tree, "tree seeded");
            writeln!(out, "Seeded {} with {} nodes", tree, model.node_count())?;
        }
        AdminCommand::Export { tree } => {
            let model = load_model(storage, &tree)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&model.export())?)?;
        }
        AdminCommand::Import { tree, file } => {
            let snapshot: GraphSnapshot = serde_json::from_slice(&std::fs::read(&file)?)?;
            let (model, report) = GraphModel::import(snapshot);
            for id in &report.duplicate_nodes {
                writeln!(out, "skipped duplicate node {}", id)?;
            }
            for (id, err) in &report.rejected_edges {
                writeln!(out, "skipped edge {}: {}", id, err)?;
            }
            store_model(storage, &tree, &model, None)?;
            writeln!(
                out,
                "Imported {} nodes and {} edges into {}",
                model.node_count(),
                model.edge_count(),
                tree
            )?;
            return Ok(report.is_clean());
        }
        AdminCommand::Search { tree, query } => {
            let model = load_model(storage, &tree)?;
            let info = compute_search_info(&model, &query);
            for id in &info.path_node_ids {
                let marker = if info.matched_node_ids.contains(id) { "*" } else { " " };
                let name = model.node(id).map(|n| n.name.as_str()).unwrap_or("?");
                writeln!(out, "{} {} {}", marker, id, name)?;
            }
            writeln!(
                out,
                "{} matched, {} on path, {} path edges",
                info.matched_node_ids.len(),
                info.path_node_ids.len(),
                info.path_edge_ids.len()
            )?;
        }
        AdminCommand::Check { tree } => {
            let model = load_model(storage, &tree)?;
            let report = model.audit();
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            return Ok(report.is_clean());
        }
        AdminCommand::Apply { tree, file } => {
            let mut model = load_model(storage, &tree)?;
            let mut reconciler = SyncReconciler::new(tree.clone());
            let reader = BufReader::new(std::fs::File::open(&file)?);

            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let event = ChangeEvent::from_json(&line)
                    .map_err(|e| format!("{}:{}: {}", file.display(), index + 1, e))?;
                let label = format!("{} {}", event.kind(), event.row_id());
                let applied = reconciler.apply(&mut model, event);
                match applied.relocked {
                    Some(node) => writeln!(out, "{} -> {:?} (relocked {})", label, applied.outcome, node)?,
                    None => writeln!(out, "{} -> {:?}", label, applied.outcome)?,
                }
            }

            model.drain_changes();
            store_model(storage, &tree, &model, None)?;
            let stats = reconciler.stats();
            writeln!(
                out,
                "applied {}, duplicates {}, dropped {}, rejected cycles {}",
                stats.applied, stats.duplicates, stats.dropped, stats.rejected_cycles
            )?;
        }
        AdminCommand::Help => print_usage(),
    }
    Ok(true)
}

fn main() {
    skilltree_logging::init(skilltree_logging::DEFAULT_FILTER);

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };
    if command == AdminCommand::Help {
        print_usage();
        return;
    }

    let data_dir = get_data_dir();
    let storage = match RocksStorage::open(&data_dir) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Failed to open storage at {}: {}", data_dir.display(), e);
            std::process::exit(1);
        }
    };

    let stdout = std::io::stdout();
    match run(command, &storage, &mut stdout.lock()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skilltree_store::MemoryStorage;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("skilltree-admin")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    fn run_to_string(command: AdminCommand, storage: &dyn Storage) -> (bool, String) {
        let mut out = Vec::new();
        let ok = run(command, storage, &mut out).unwrap();
        (ok, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args(&args(&["search", "web", "style", "sheets"])).unwrap(),
            AdminCommand::Search {
                tree: "web".into(),
                query: "style sheets".into()
            }
        );
        assert!(parse_args(&args(&["import", "web"])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&[])).is_err());
    }

    #[test]
    fn test_seed_then_check() {
        let storage = MemoryStorage::new();
        let (ok, _) = run_to_string(
            AdminCommand::Seed {
                tree: "web".into(),
                title: Some("Web".into()),
            },
            &storage,
        );
        assert!(ok);
        assert_eq!(storage.get_tree(&"web".into()).unwrap().unwrap().title, "Web");

        let (ok, report) = run_to_string(AdminCommand::Check { tree: "web".into() }, &storage);
        assert!(ok);
        assert!(report.contains("\"cyclic_nodes\": []"));
    }

    #[test]
    fn test_search_output() {
        let storage = MemoryStorage::new();
        run_to_string(AdminCommand::Seed { tree: "web".into(), title: None }, &storage);

        let (_, out) = run_to_string(
            AdminCommand::Search {
                tree: "web".into(),
                query: "cascading".into(),
            },
            &storage,
        );
        assert!(out.contains("* 2 CSS"));
        assert!(out.contains("  1 HTML"));
        assert!(out.contains("1 matched, 2 on path, 1 path edges"));
    }

    #[test]
    fn test_apply_events_file() {
        let dir = TempDir::new().unwrap();
        let storage = RocksStorage::open(dir.path().join("db")).unwrap();
        run_to_string(AdminCommand::Seed { tree: "web".into(), title: None }, &storage);

        let events = dir.path().join("events.jsonl");
        std::fs::write(
            &events,
            concat!(
                r#"{"entityType":"node","eventType":"insert","row":{"id":"3","tree_id":"web","name":"JS","unlocked":false}}"#,
                "\n",
                r#"{"entityType":"node","eventType":"insert","row":{"id":"3","tree_id":"web","name":"JS","unlocked":false}}"#,
                "\n\n",
                r#"{"entityType":"edge","eventType":"insert","row":{"id":"e2-1","tree_id":"web","source":"2","target":"1"}}"#,
                "\n",
            ),
        )
        .unwrap();

        let (ok, out) = run_to_string(
            AdminCommand::Apply {
                tree: "web".into(),
                file: events,
            },
            &storage,
        );
        assert!(ok);
        assert!(out.contains("node insert 3 -> Inserted"));
        assert!(out.contains("node insert 3 -> Duplicate"));
        assert!(out.contains("edge insert e2-1 -> RejectedCycle"));
        assert_eq!(storage.select_nodes(&"web".into()).unwrap().len(), 3);
        assert_eq!(storage.select_edges(&"web".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_import_reports_rejected_edges() {
        let dir = TempDir::new().unwrap();
        let storage = MemoryStorage::new();
        let mut snapshot = seed_graph();
        snapshot.edges.push(skilltree_graph::Edge::new("loop", "2", "1"));
        let file = dir.path().join("snapshot.json");
        std::fs::write(&file, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let (ok, out) = run_to_string(
            AdminCommand::Import {
                tree: "web".into(),
                file,
            },
            &storage,
        );
        assert!(!ok);
        assert!(out.contains("skipped edge loop"));
        assert_eq!(storage.select_edges(&"web".into()).unwrap().len(), 1);
    }
}
