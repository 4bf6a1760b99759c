//! Benchmarks for metadata and model loading.
//!
//! Run with: cargo bench

use std::fmt::Write;
use std::path::PathBuf;

use criterion::{Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

use quire::format::sniff;
use quire::{Book, Dispatcher};

const CHAPTERS: usize = 200;

fn fb2_book() -> String {
    let mut body = String::new();
    for i in 0..CHAPTERS {
        write!(
            body,
            "<section id=\"c{i}\"><title><p>Chapter {i}</p></title>\
             <p>It was a <emphasis>dark</emphasis> and stormy night, see <a l:href=\"#c0\">start</a>.</p>\
             <p>The rain fell in torrents, except at occasional intervals.</p></section>"
        )
        .unwrap();
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <FictionBook xmlns=\"http://www.gribuser.ru/xml/fictionbook/2.0\" xmlns:l=\"http://www.w3.org/1999/xlink\">\
         <description><title-info><author><first-name>Edward</first-name><last-name>Bulwer-Lytton</last-name></author>\
         <book-title>Paul Clifford</book-title><lang>en</lang></title-info></description>\
         <body>{body}</body></FictionBook>"
    )
}

fn text_book() -> String {
    let mut text = String::new();
    for i in 0..CHAPTERS * 5 {
        writeln!(text, "Paragraph {i} begins here,\nand runs on to a second line.\n").unwrap();
    }
    text
}

struct Fixtures {
    _dir: TempDir,
    fb2: PathBuf,
    txt: PathBuf,
}

fn fixtures() -> Fixtures {
    let dir = TempDir::new().unwrap();
    let fb2 = dir.path().join("clifford.fb2");
    std::fs::write(&fb2, fb2_book()).unwrap();
    let txt = dir.path().join("clifford.txt");
    std::fs::write(&txt, text_book()).unwrap();
    Fixtures { _dir: dir, fb2, txt }
}

// ============================================================================
// Metadata
// ============================================================================

fn bench_metadata(c: &mut Criterion) {
    let fixtures = fixtures();
    let dispatcher = Dispatcher::with_defaults();

    c.bench_function("metadata_fb2", |b| {
        b.iter(|| {
            let mut book = Book::new(&fixtures.fb2);
            dispatcher.load_metadata(&mut book).unwrap();
            book
        });
    });
}

fn bench_metadata_batch(c: &mut Criterion) {
    let fixtures = fixtures();
    let dispatcher = Dispatcher::with_defaults();

    c.bench_function("metadata_batch_64", |b| {
        b.iter(|| {
            let mut books: Vec<Book> = (0..64).map(|_| Book::new(&fixtures.fb2)).collect();
            dispatcher.load_metadata_all(&mut books)
        });
    });
}

// ============================================================================
// Model
// ============================================================================

fn bench_model(c: &mut Criterion) {
    let fixtures = fixtures();
    let dispatcher = Dispatcher::with_defaults();
    let fb2 = Book::new(&fixtures.fb2);
    let txt = Book::new(&fixtures.txt);

    c.bench_function("model_fb2", |b| {
        b.iter(|| dispatcher.load_model(&fb2).unwrap());
    });
    c.bench_function("model_txt", |b| {
        b.iter(|| dispatcher.load_model(&txt).unwrap());
    });
}

fn bench_sniff(c: &mut Criterion) {
    let head = fb2_book().into_bytes();
    let head = &head[..head.len().min(4096)];
    c.bench_function("sniff", |b| b.iter(|| sniff(head)));
}

criterion_group!(
    benches,
    bench_metadata,
    bench_metadata_batch,
    bench_model,
    bench_sniff
);
criterion_main!(benches);
