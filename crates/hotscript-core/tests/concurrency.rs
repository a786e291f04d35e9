//! Concurrent callers and registrars sharing one host.

mod common;

use common::fake_host;
use hotscript_core::{Bindings, ScriptHost, Value};
use std::sync::{Arc, Barrier};
use std::thread;

const CALLERS: usize = 8;
const REGISTRARS: usize = 4;
const ROUNDS: usize = 200;

#[test]
fn callers_and_registrars_do_not_interfere() {
    let (host, _) = fake_host();
    let host = Arc::new(host);
    host.try_register("shared", "fn f => \"stable\"", &Bindings::new())
        .unwrap();

    let barrier = Arc::new(Barrier::new(CALLERS + REGISTRARS));
    let mut handles = Vec::new();

    for _ in 0..CALLERS {
        let host = Arc::clone(&host);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..ROUNDS {
                assert_eq!(host.call("shared", "f", &[]), Some(Value::from("stable")));
            }
        }));
    }

    for r in 0..REGISTRARS {
        let host = Arc::clone(&host);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..ROUNDS / 10 {
                let key = format!("r{r}-{i}");
                host.try_register(&key, format!("fn id => \"{key}\""), &Bindings::new())
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(host.registry().len(), 1 + REGISTRARS * (ROUNDS / 10));
    for r in 0..REGISTRARS {
        for i in 0..ROUNDS / 10 {
            let key = format!("r{r}-{i}");
            assert_eq!(host.call(&key, "id", &[]), Some(Value::from(key.as_str())));
        }
    }
}

/// A key being replaced while it is called yields either the old or the
/// new form, never a mix.
#[test]
fn replacement_under_load_is_old_or_new() {
    let (host, _) = fake_host();
    let host = Arc::new(host);
    host.try_register("k", "fn version => 0\nfn twin => 0", &Bindings::new())
        .unwrap();

    let writer = {
        let host = Arc::clone(&host);
        thread::spawn(move || {
            for v in 1..=ROUNDS {
                host.try_register("k", format!("fn version => {v}\nfn twin => {v}"), &Bindings::new())
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..CALLERS)
        .map(|_| {
            let host = Arc::clone(&host);
            thread::spawn(move || {
                let mut last_seen = 0;
                for _ in 0..ROUNDS {
                    let form = host.lookup("k").unwrap();
                    let version = form.invoke("version", &[]).unwrap();
                    let twin = form.invoke("twin", &[]).unwrap();
                    assert_eq!(version, twin, "one form, one version");

                    let generation = form.generation();
                    assert!(generation >= last_seen, "generations never go back");
                    last_seen = generation;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(host.try_call("k", "version", &[]).unwrap(), Value::I64(ROUNDS as i64));
}

#[cfg(feature = "lua")]
#[test]
fn lua_forms_are_callable_from_many_threads() {
    use hotscript_core::{BuiltinLocator, EngineProvider};

    let host = Arc::new(ScriptHost::new(
        EngineProvider::try_init("lua", &BuiltinLocator::new()).unwrap(),
    ));
    host.try_register(
        "fib",
        "function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end",
        &Bindings::new(),
    )
    .unwrap();

    let handles: Vec<_> = (0..CALLERS)
        .map(|t| {
            let host = Arc::clone(&host);
            thread::spawn(move || {
                let key = format!("own-{t}");
                host.try_register(&key, "function id(x) return x end", &Bindings::new())
                    .unwrap();
                for _ in 0..20 {
                    assert_eq!(host.call("fib", "fib", &[Value::from(15)]), Some(Value::I64(610)));
                    assert_eq!(
                        host.call(&key, "id", &[Value::from(t as i64)]),
                        Some(Value::I64(t as i64))
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
