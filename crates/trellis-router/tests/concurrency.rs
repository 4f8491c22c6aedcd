//! Tests for lookups running while routes are being mounted.

mod common;
use common::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use trellis_router::{Application, Method, ParamValue, Request, Resolution};

#[test]
fn lookups_see_whole_tables_during_remounts() {
    let app = books_app();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let found = find(&app, "/books/42");
                    assert_eq!(found.handler.name(), "BooksAction");
                    assert_eq!(found.param_values, vec![ParamValue::Int(42)]);

                    let table = app.routes().unwrap();
                    // Every mount adds one fixed and one variable route, so a
                    // half built table would show uneven counts.
                    assert_eq!(table.fixed_len(), table.variable_len());
                }
            });
        }

        s.spawn(|| {
            for i in 0..50 {
                let prefix = format!("/r{i}");
                app.mount(&prefix, declared("RAction", &["", "/{id}"]))
                    .unwrap();
            }
            done.store(true, Ordering::Release);
        });
    });

    for i in 0..50 {
        assert_eq!(find(&app, &format!("/r{i}/7")).param_values, vec![ParamValue::Int(7)]);
        assert!(app.find(&format!("/r{i}")).unwrap().is_some());
    }
    assert_eq!(app.list_mappings().len(), 2 + 100);
}

#[test]
fn published_table_outlives_a_remount() {
    let app = books_app();
    let before = app.routes().unwrap();

    app.mount("/authors", declared("AuthorsAction", &["/{id}"]))
        .unwrap();

    assert!(before.find("/authors/1").unwrap().is_none());
    assert!(app.find("/authors/1").unwrap().is_some());
    assert!(before.find("/books/1").unwrap().is_some());
}

#[test]
fn dispatch_from_many_threads() {
    let app = Application::new();
    app.mount("/books", trellis_router::HandlerRef::of::<BooksAction>())
        .unwrap();

    thread::scope(|s| {
        let handles: Vec<_> = (1..=8)
            .map(|id| {
                let app = &app;
                s.spawn(move || {
                    let resp = app.dispatch(&Request::get(format!("/books/{id}"))).unwrap();
                    (resp.status, resp.body_string().unwrap())
                })
            })
            .collect();
        for (id, handle) in (1..=8).zip(handles) {
            let (status, body) = handle.join().unwrap();
            assert_eq!(status, 200);
            assert_eq!(body, format!("<p>book {id}</p>"));
        }
    });

    assert!(matches!(
        app.resolve(Method::Patch, "/books/1").unwrap(),
        Resolution::MethodNotAllowed { .. }
    ));
}
