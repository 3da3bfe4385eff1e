use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use schaltung::nodes::{Mixer, UnitNode};
use schaltung::{attach_graph, detach_last_user, Engine, MemoryEngine, Node, NodeRef, UnitKind};

/// A mixer fed by `voices` chains of oscillator -> filter -> amp.
fn voices(voices: usize) -> (Mixer, Vec<NodeRef>) {
    let chains = (0..voices)
        .map(|_| -> NodeRef {
            let osc: NodeRef = Arc::new(UnitNode::new(UnitKind::Generator));
            let filter: NodeRef = Arc::new(UnitNode::new(UnitKind::Effect).with_input(osc));
            Arc::new(UnitNode::new(UnitKind::Effect).with_input(filter))
        })
        .collect::<Vec<_>>();
    (Mixer::new().with_inputs(chains.iter().cloned()), chains)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("attach_graph(32 voices)", |b| {
        let (mixer, _) = voices(32);
        b.iter(|| {
            let mut engine = MemoryEngine::new(48_000);
            engine.attach(mixer.unit());
            black_box(attach_graph(&mut engine, &mixer))
        })
    });

    c.bench_function("detach_last_user(32 voices)", |b| {
        let (mixer, chains) = voices(32);
        b.iter(|| {
            let mut engine = MemoryEngine::new(48_000);
            engine.attach(mixer.unit());
            attach_graph(&mut engine, &mixer);
            for chain in &chains {
                detach_last_user(&mut engine, &mixer, chain.as_ref());
            }
            black_box(engine.attached_units().len())
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
