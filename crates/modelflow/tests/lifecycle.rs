// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! End-to-end lifecycle over the filesystem registry: publish a project
//! lineage, train two generations, then apply the trained pipeline.

use std::sync::Arc;

use parking_lot::Mutex;

use modelflow::asset::{Assets, Cache, Directory, LineageKey, Package, Posix, State};
use modelflow::dsl::{Kind, Query, Table, Value};
use modelflow::error::Result;
use modelflow::flow::{Chain, Composable, Consumer, Mapper, Node, Operator, Origin, Path, Segment, Spec};
use modelflow::io::{Feed, Sink};
use modelflow::runtime::{Instruction, Runner, Symbol};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn spec(name: &str) -> Spec {
    Spec::new(name, serde_json::json!({}))
}

struct StaticFeed;

impl Feed for StaticFeed {
    fn load(
        &self,
        _source: &Query,
        _lower: Option<&Value>,
        _upper: Option<&Value>,
    ) -> Result<Segment> {
        Ok(Segment::with(
            Path::new(Node::worker(spec("extract_apply"), 0, 1))?,
            Path::new(Node::worker(spec("extract_train"), 0, 1))?,
            Path::new(Node::worker(spec("extract_label"), 0, 1))?,
        ))
    }
}

struct StaticSink;

impl Sink for StaticSink {
    fn save(&self) -> Result<Segment> {
        Segment::new()?.extend(
            Some(Path::new(Node::worker(spec("publish"), 1, 1))?),
            None,
            None,
        )
    }
}

struct DiskRunner {
    assets: Assets,
    feed: StaticFeed,
    sink: StaticSink,
    source: Query,
    pipeline: Chain,
    programs: Mutex<Vec<Vec<Symbol>>>,
}

impl DiskRunner {
    fn new(root: &std::path::Path) -> Self {
        let registry = Arc::new(Posix::new(root));
        let directory = Directory::new(registry, Arc::new(Cache::default()));
        directory
            .project("forecast")
            .put(&Package {
                lineage: LineageKey::new(1, 0, 0),
                content: b"project".to_vec(),
            })
            .expect("publish lineage");
        let table = Table::new("events", [("value", Kind::Integer)]);
        let source = table.select([table.field("value").expect("schema field")]);
        Self {
            assets: Assets::new(directory, "forecast", None, None),
            feed: StaticFeed,
            sink: StaticSink,
            source,
            pipeline: Chain::new(
                Chain::new(Origin, Mapper::new(spec("impute"))),
                Consumer::new(spec("model")),
            ),
            programs: Mutex::new(Vec::new()),
        }
    }
}

impl Runner for DiskRunner {
    fn assets(&self) -> &Assets {
        &self.assets
    }

    fn feed(&self) -> &dyn Feed {
        &self.feed
    }

    fn sink(&self) -> &dyn Sink {
        &self.sink
    }

    fn source(&self) -> &Query {
        &self.source
    }

    fn pipeline(&self) -> &dyn Composable {
        &self.pipeline
    }

    fn run(&self, symbols: Vec<Symbol>, state: Option<State>) -> Result<()> {
        if let Some(state) = &state {
            for symbol in &symbols {
                match &symbol.instruction {
                    Instruction::Dumper { group } => {
                        state.dump(*group, b"fitted-parameters")?;
                    }
                    Instruction::Committer => state.commit(None)?,
                    _ => {}
                }
            }
        }
        self.programs.lock().push(symbols);
        Ok(())
    }
}

#[test]
fn test_lifecycle_on_disk() {
    init_tracing();
    let root = tempfile::tempdir().expect("registry root");
    let runner = DiskRunner::new(root.path());

    // Bootstrap: nothing trained yet.
    assert!(runner.assets().tag().expect("null tag").is_empty());

    runner
        .train(None, Some(Value::Integer(10)))
        .expect("first training");
    runner
        .train(None, Some(Value::Integer(20)))
        .expect("second training");

    let tag = runner.assets().tag().expect("trained tag");
    assert!(tag.training.triggered());
    assert_eq!(tag.training.ordinal, Some(Value::Integer(20)));
    assert_eq!(tag.states.len(), 2);

    // Registry tree: two committed generations with their state blobs.
    assert!(root.path().join("forecast/1.0.0/1/tag.json").exists());
    assert!(root.path().join("forecast/1.0.0/2/tag.json").exists());
    for sid in &tag.states {
        assert!(root
            .path()
            .join(format!("forecast/1.0.0/2/{sid}.bin"))
            .exists());
    }

    // Applying loads the latest generation's states.
    runner.apply(None, None).expect("apply");
    let programs = runner.programs.lock();
    let apply_program = programs.last().expect("apply program");
    let loaded: Vec<_> = apply_program
        .iter()
        .filter_map(|symbol| match &symbol.instruction {
            Instruction::Loader { sid, .. } => Some(*sid),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, tag.states);
}

#[test]
fn test_evaluation_against_disk_assets() {
    init_tracing();
    let root = tempfile::tempdir().expect("registry root");

    struct Evaluated(DiskRunner, Consumer);

    impl Runner for Evaluated {
        fn assets(&self) -> &Assets {
            self.0.assets()
        }

        fn feed(&self) -> &dyn Feed {
            self.0.feed()
        }

        fn sink(&self) -> &dyn Sink {
            self.0.sink()
        }

        fn source(&self) -> &Query {
            self.0.source()
        }

        fn pipeline(&self) -> &dyn Composable {
            self.0.pipeline()
        }

        fn evaluation(&self) -> Option<&dyn Operator> {
            Some(&self.1)
        }

        fn run(&self, symbols: Vec<Symbol>, state: Option<State>) -> Result<()> {
            self.0.run(symbols, state)
        }
    }

    let runner = Evaluated(DiskRunner::new(root.path()), Consumer::new(spec("metric")));
    runner.cvscore(None, None).expect("evaluation");

    // Evaluation trains in-program only; the store stays untouched.
    assert!(runner.assets().tag().expect("tag").is_empty());
    let programs = runner.0.programs.lock();
    assert!(programs[0].iter().any(|symbol| matches!(
        &symbol.instruction,
        Instruction::Trainer { spec, .. } if spec.name() == "metric"
    )));
}
