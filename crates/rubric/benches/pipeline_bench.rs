use criterion::{criterion_group, criterion_main, Criterion};
use rubric::{
    formula_grammar, number_bindings, Bindings, FormulaEngine, Lexer, Limits, ParserRuntime,
    ParsingTable,
};
use std::hint::black_box;

const SIMPLE: &str = "3 + 4 * 2";
const SCORING: &str =
    "IF({exam} >= 60, MIN({exam} * 0.6 + {interview} * 0.4, 100), {exam} * 0.5)";

fn bench_tokenize(c: &mut Criterion) {
    let lexer = Lexer::new();
    c.bench_function("tokenize_scoring_formula", |b| {
        b.iter(|| lexer.tokenize(black_box(SCORING)).unwrap());
    });
}

fn bench_table_construction(c: &mut Criterion) {
    c.bench_function("build_lalr_table", |b| {
        let grammar = formula_grammar();
        b.iter(|| ParsingTable::build(black_box(&grammar)).unwrap());
    });
}

fn bench_parse(c: &mut Criterion) {
    let grammar = formula_grammar();
    let table = ParsingTable::build(&grammar).unwrap();
    let limits = Limits::default();
    let tokens = Lexer::new().tokenize(SCORING).unwrap();
    c.bench_function("parse_scoring_formula", |b| {
        let runtime = ParserRuntime::new(&grammar, &table, &limits, false);
        b.iter(|| runtime.parse(black_box(&tokens)).unwrap());
    });
}

fn bench_end_to_end(c: &mut Criterion) {
    let bindings = number_bindings(&[("exam", 72.0), ("interview", 85.0)]);
    c.bench_function("evaluate_simple_uncached", |b| {
        let engine = FormulaEngine::with_options(rubric::EngineOptions {
            result_cache_capacity: 0,
            ..rubric::EngineOptions::default()
        });
        b.iter(|| engine.evaluate(black_box(SIMPLE), &Bindings::new()).unwrap());
    });
    c.bench_function("evaluate_scoring_uncached", |b| {
        let engine = FormulaEngine::with_options(rubric::EngineOptions {
            result_cache_capacity: 0,
            ..rubric::EngineOptions::default()
        });
        b.iter(|| engine.evaluate(black_box(SCORING), &bindings).unwrap());
    });
    c.bench_function("evaluate_scoring_cached", |b| {
        let engine = FormulaEngine::new();
        b.iter(|| engine.evaluate(black_box(SCORING), &bindings).unwrap());
    });
}

criterion_group!(
    benches,
    bench_tokenize,
    bench_table_construction,
    bench_parse,
    bench_end_to_end
);
criterion_main!(benches);
