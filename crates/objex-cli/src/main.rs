use std::env;
use std::process::ExitCode;

use objex_core::runtime::heap::{EmbeddedHeap, HeapBuilder};
use objex_core::runtime::ObjectData;
use objex_core::{
    analyze, dump_graph, read_analyzed, read_raw, write_analyzed, Classification, DumpOptions, NodeId, QueryEngine,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_env("OBJEX_LOG"))
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("capture") => capture(&args[2..]),
        Some("explore") => explore(&args[2..]),
        _ => {
            eprintln!("usage: objex capture <destination> [rss-target-bytes]");
            eprintln!("       objex explore <analyzed-snapshot> <stats|lookup|outbound|inbound|random|paths> [args...]");
            ExitCode::FAILURE
        }
    }
}

/// `capture`: runs the capture entry point against this crate's embedded
/// demo heap (there is no live interpreter to attach to outside a real
/// deployment; see `spec.md` §9, "Dynamic runtime reflection"), then runs
/// the analysis pass in place so the artifact is immediately explorable.
fn capture(args: &[String]) -> ExitCode {
    let Some(destination) = args.first() else {
        eprintln!("error: capture requires a destination path");
        return ExitCode::FAILURE;
    };
    let target_rss_bytes: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);

    let heap = demo_heap();
    let options = DumpOptions::default();
    if let Err(err) = dump_graph(&heap, destination, &options, target_rss_bytes) {
        eprintln!("error: capture failed: {err}");
        return ExitCode::FAILURE;
    }
    eprintln!("captured demo heap to {destination}");

    let raw = match read_raw(destination) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("error: reading back raw snapshot: {err}");
            return ExitCode::FAILURE;
        }
    };
    let analyzed = analyze(raw);
    if let Err(err) = write_analyzed(destination, &analyzed) {
        eprintln!("error: writing analyzed snapshot: {err}");
        return ExitCode::FAILURE;
    }
    eprintln!(
        "analyzed: {} nodes, {} bytes, {} roots",
        analyzed.stats.total_nodes,
        analyzed.stats.total_bytes,
        analyzed.roots.len()
    );
    ExitCode::SUCCESS
}

fn explore(args: &[String]) -> ExitCode {
    let Some(path) = args.first() else {
        eprintln!("error: explore requires an analyzed snapshot path");
        return ExitCode::FAILURE;
    };
    let snapshot = match read_analyzed(path) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let engine = QueryEngine::new(&snapshot);

    match args.get(1).map(String::as_str) {
        Some("stats") => {
            let stats = engine.stats();
            println!("total_nodes: {}", stats.total_nodes);
            println!("total_bytes: {}", stats.total_bytes);
            for (classification, count) in &stats.per_classification {
                println!("  {}: {count}", classification_name(*classification));
            }
            ExitCode::SUCCESS
        }
        Some("lookup") => with_node_id(args.get(2), |id| match engine.lookup(id) {
            Ok(summary) => {
                println!("{summary} size={} refcount={}", summary.size, summary.refcount);
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        }),
        Some("outbound") => with_node_id(args.get(2), |id| match engine.outbound(id) {
            Ok(edges) => {
                for edge in edges {
                    println!("{} -> {}", edge.label, edge.summary);
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        }),
        Some("inbound") => with_node_id(args.get(2), |id| match engine.inbound(id) {
            Ok(edges) => {
                for edge in edges {
                    println!("{} <- {}", edge.label, edge.summary);
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        }),
        Some("random") => {
            let mut rng = ChaCha8Rng::seed_from_u64(0);
            match engine.random(&mut rng) {
                Some(id) => {
                    println!("{id:?}");
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("error: snapshot has no non-root nodes");
                    ExitCode::FAILURE
                }
            }
        }
        Some("paths") => with_node_id(args.get(2), |id| {
            let k: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(3);
            let budget: usize =
                args.get(4).and_then(|s| s.parse().ok()).unwrap_or(objex_core::DEFAULT_PATH_BUDGET);
            match engine.paths_to_roots(id, k, budget) {
                Ok(result) => {
                    println!("termination: {:?}", result.termination);
                    println!("budget_exhausted: {}", result.budget_exhausted);
                    for path in &result.paths {
                        println!("  {}", path.labels.join(" -> "));
                    }
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::FAILURE
                }
            }
        }),
        _ => {
            eprintln!("error: unknown explore command");
            ExitCode::FAILURE
        }
    }
}

fn with_node_id(arg: Option<&String>, f: impl FnOnce(NodeId) -> ExitCode) -> ExitCode {
    let Some(raw) = arg else {
        eprintln!("error: missing node id");
        return ExitCode::FAILURE;
    };
    match raw.parse::<u64>() {
        Ok(index) => f(NodeId::new(index)),
        Err(_) => {
            eprintln!("error: {raw} is not a valid node id");
            ExitCode::FAILURE
        }
    }
}

fn classification_name(classification: Classification) -> &'static str {
    classification.as_str()
}

/// A small, hand-built object graph (a module attr dict with a literal key
/// and an object-valued key, a list, one root frame) so `capture`/`explore`
/// have something real to show without a live interpreter attached.
fn demo_heap() -> EmbeddedHeap {
    let mut builder = HeapBuilder::new();

    let key_obj = builder.str("config");
    let inner_list_a = builder.int(1);
    let inner_list_b = builder.int(2);
    let settings_list =
        builder.alloc_builtin(Classification::List, ObjectData::List { items: vec![inner_list_a, inner_list_b] });

    let module_dict = builder.alloc_builtin(
        Classification::Dict,
        ObjectData::Dict {
            entries: vec![
                (objex_core::runtime::DictKey::Literal("settings".to_owned()), settings_list),
                (objex_core::runtime::DictKey::Object(key_obj), inner_list_b),
            ],
        },
    );
    let module = builder.alloc_builtin(
        Classification::Module,
        ObjectData::Module { name: "demo".to_owned(), dict: module_dict },
    );

    builder.add_module_root(module);

    let frame_globals = builder.empty_dict();
    let frame_locals = builder.empty_dict();
    let frame = builder.alloc_builtin(
        Classification::Frame,
        ObjectData::Frame { locals: frame_locals, globals: frame_globals, f_back: None },
    );
    builder.add_frame_root(frame);

    builder.build()
}
