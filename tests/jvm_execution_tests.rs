//! Generated classes run on a real JVM with full verification. Each test
//! builds a class with a `main` method printing its results and compares
//! stdout; without a `java` launcher the tests pass without running.

use classmaker::{
    AnonSpec, AtomicAccess, AtomicOp, Block, ClassMaker, Code, Constant, DirectoryOutput, Expr, FieldDef, MemoryOrder,
    MethodDef, MethodRef, Modifiers, Result, TrySpec, Type,
};

mod common;
use common::{init_logging, println, run_java};

fn main_def() -> MethodDef {
    MethodDef::new("main", Type::void())
        .modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
        .param("args", Type::array_of(Type::string()))
}

/// Write every class of `maker` to a fresh directory and run `main_class`
fn run(maker: &mut ClassMaker, main_class: &str) -> Option<String> {
    let dir = tempfile::tempdir().unwrap();
    maker.finish_to(&mut DirectoryOutput::new(dir.path())).expect("class should assemble");
    run_java(dir.path(), main_class)
}

fn print_int(code: &mut Code, blk: Block, value: Expr) -> Result<()> {
    println(code, blk, value, Type::int())
}

#[test]
fn test_mixed_arithmetic_promotes_to_double() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Adder");
    let add = maker
        .method(
            MethodDef::new("add", Type::double())
                .modifiers(Modifiers::PUBLIC | Modifiers::STATIC)
                .param("a", Type::int())
                .param("b", Type::double()),
            |code, blk| {
                let sum = Expr::add(code.param(blk, 0)?.get(), code.param(blk, 1)?.get())?;
                code.return_value(blk, sum)
            },
        )
        .unwrap();
    maker
        .method(main_def(), |code, blk| {
            let result = code.invoke(&add, None, vec![Expr::int(3), Expr::double(4.5)])?;
            println(code, blk, result, Type::double())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Adder") {
        assert_eq!(out.trim(), "7.5");
    }
}

#[test]
fn test_string_switch_with_hash_collision() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Words");
    let classify = maker
        .method(
            MethodDef::new("classify", Type::int()).modifiers(Modifiers::STATIC).param("word", Type::string()),
            |code, blk| {
                let word = code.param(blk, 0)?.get();
                code.switch(blk, word, |code, sw| {
                    code.case(sw, ["one"], |code, arm| code.return_value(arm, Expr::int(1)))?;
                    code.case(sw, ["two", "deux"], |code, arm| code.return_value(arm, Expr::int(2)))?;
                    // "Aa" and "BB" share a hash code
                    code.case(sw, ["Aa"], |code, arm| code.return_value(arm, Expr::int(10)))?;
                    code.case(sw, ["BB"], |code, arm| code.return_value(arm, Expr::int(20)))?;
                    Ok(())
                })?;
                code.return_value(blk, Expr::int(-1))
            },
        )
        .unwrap();
    maker
        .method(main_def(), |code, blk| {
            for word in ["one", "deux", "Aa", "BB", "nine"] {
                let result = code.invoke(&classify, None, vec![Expr::string(word)])?;
                print_int(code, blk, result)?;
            }
            Ok(())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Words") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["1", "2", "10", "20", "-1"]);
    }
}

#[test]
fn test_catch_clauses_match_in_order() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Catcher");
    let probe = maker
        .method(
            MethodDef::new("probe", Type::int()).modifiers(Modifiers::STATIC).param("kind", Type::int()),
            |code, blk| {
                let kind = code.param(blk, 0)?;
                code.try_(
                    blk,
                    |code, body| {
                        let ise = MethodRef::constructor("java/lang/IllegalStateException", vec![]);
                        let iae = MethodRef::constructor("java/lang/IllegalArgumentException", vec![]);
                        code.if_(body, Expr::eq(kind.get(), Expr::int(1))?, |code, then| {
                            let e = code.new_instance(&ise, vec![])?;
                            code.throw_(then, e)
                        })?;
                        code.if_(body, Expr::eq(kind.get(), Expr::int(2))?, |code, then| {
                            let e = code.new_instance(&iae, vec![])?;
                            code.throw_(then, e)
                        })?;
                        code.return_value(body, Expr::int(0))
                    },
                    TrySpec::new()
                        .catch(&["java.lang.IllegalStateException"], |code, handler, _| {
                            code.return_value(handler, Expr::int(1))
                        })
                        .catch(&["java.lang.RuntimeException"], |code, handler, _| {
                            code.return_value(handler, Expr::int(2))
                        }),
                )?;
                Ok(())
            },
        )
        .unwrap();
    maker
        .method(main_def(), |code, blk| {
            for kind in 0..3 {
                let result = code.invoke(&probe, None, vec![Expr::int(kind)])?;
                print_int(code, blk, result)?;
            }
            Ok(())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Catcher") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["0", "1", "2"]);
    }
}

#[test]
fn test_finally_runs_once_on_return() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Finally");
    let runs = maker.add_field(FieldDef::new("runs", Type::int()).modifiers(Modifiers::STATIC)).unwrap();
    let compute = maker
        .method(MethodDef::new("compute", Type::int()).modifiers(Modifiers::STATIC), |code, blk| {
            let runs = runs.clone();
            code.try_(
                blk,
                |code, body| code.return_value(body, Expr::int(42)),
                TrySpec::new().finally(move |code, fin| {
                    let next = Expr::add(Expr::get_static(&runs)?, Expr::int(1))?;
                    code.put_static(fin, &runs, next)
                }),
            )?;
            Ok(())
        })
        .unwrap();
    maker
        .method(main_def(), |code, blk| {
            let result = code.invoke(&compute, None, vec![])?;
            print_int(code, blk, result)?;
            print_int(code, blk, Expr::get_static(&runs)?)
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Finally") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["42", "1"]);
    }
}

#[test]
fn test_loop_with_break_and_continue() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Loops");
    maker
        .method(main_def(), |code, blk| {
            // sum of odd i below 10, stopping at 7
            let sum = code.declare_init(blk, "sum", Type::int(), Expr::int(0))?;
            let i = code.declare_init(blk, "i", Type::int(), Expr::int(0))?;
            let step = i.clone();
            code.for_(
                blk,
                Expr::lt(i.get(), Expr::int(10))?,
                move |code, s| code.inc(s, &step, Expr::int(1)),
                |code, body, lp| {
                    code.if_(body, Expr::eq(i.get(), Expr::int(7))?, |code, then| code.break_(then, lp))?;
                    let even = Expr::eq(Expr::rem(i.get(), Expr::int(2))?, Expr::int(0))?;
                    code.if_(body, even, |code, then| code.continue_(then, lp))?;
                    code.set(body, &sum, Expr::add(sum.get(), i.get())?)
                },
            )?;
            print_int(code, blk, sum.get())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Loops") {
        // 1 + 3 + 5
        assert_eq!(out.trim(), "9");
    }
}

#[test]
fn test_lambda_captures_local() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Lambdas");
    let sam = MethodRef::of_interface("java/util/function/IntSupplier", "getAsInt", vec![], Type::int());
    maker
        .method(main_def(), |code, blk| {
            let base = code.declare_init(blk, "base", Type::int(), Expr::int(41))?;
            let captured = base.clone();
            let supplier = code.lambda(blk, &sam, move |code, body| {
                code.return_value(body, Expr::add(captured.get(), Expr::int(1))?)
            })?;
            let value = code.invoke(&sam, Some(supplier), vec![])?;
            print_int(code, blk, value)
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Lambdas") {
        assert_eq!(out.trim(), "42");
    }
}

#[test]
fn test_atomic_static_field_update() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Atomics");
    let total = maker.add_field(FieldDef::new("total", Type::long()).modifiers(Modifiers::STATIC)).unwrap();
    maker
        .method(main_def(), |code, blk| {
            let add = |code: &Code, n: i64| -> Result<Expr> {
                let access = AtomicAccess::field(None, &total)?;
                Expr::atomic(code.registry(), AtomicOp::GetAndAdd, access, MemoryOrder::Volatile, vec![Expr::long(n)])
            };
            let first = add(code, 5)?;
            code.eval(blk, first)?;
            let previous = add(code, 7)?;
            println(code, blk, previous, Type::long())?;
            println(code, blk, Expr::field(None, &total, MemoryOrder::Acquire)?, Type::long())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Atomics") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["5", "12"]);
    }
}

#[test]
fn test_resource_constant_decodes_at_runtime() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Resources");
    let entries: Vec<(Constant, Constant)> =
        (0..20).map(|i| (Constant::String(format!("k{i}")), Constant::Long(i64::from(i) * 3))).collect();
    maker
        .method(main_def(), |code, blk| {
            let map = Expr::constant(Constant::Map(entries))?;
            let get = MethodRef::of_interface(
                "java/util/Map",
                "get",
                vec![Type::object()],
                Type::object(),
            );
            let value = code.invoke(&get, Some(map), vec![Expr::string("k7")])?;
            println(code, blk, value, Type::object())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Resources") {
        assert_eq!(out.trim(), "21");
    }
}

#[test]
fn test_string_switch_expression_with_default() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/SwitchExpr");
    let lookup = maker
        .method(
            MethodDef::new("lookup", Type::int()).modifiers(Modifiers::PUBLIC | Modifiers::STATIC).param("key", Type::string()),
            |code, blk| {
                let key = code.param(blk, 0)?.get();
                let value = code.switch_expr(blk, key, &Type::int(), |code, sw| {
                    code.case(sw, ["zero"], |code, arm| code.yield_(arm, Expr::int(0)))?;
                    code.case(sw, ["one"], |code, arm| code.yield_(arm, Expr::int(1)))?;
                    code.default(sw, |code, arm| code.yield_(arm, Expr::int(-1)))
                })?;
                code.return_value(blk, value)
            },
        )
        .unwrap();
    maker
        .method(main_def(), |code, blk| {
            for key in ["one", "nine", "zero"] {
                let result = code.invoke(&lookup, None, vec![Expr::string(key)])?;
                print_int(code, blk, result)?;
            }
            Ok(())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.SwitchExpr") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["1", "-1", "0"]);
    }
}

#[test]
fn test_wider_catch_declared_first_wins() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Wide");
    let divide = maker
        .method(
            MethodDef::new("divide", Type::int()).modifiers(Modifiers::STATIC).param("d", Type::int()),
            |code, blk| {
                let d = code.param(blk, 0)?;
                code.try_(
                    blk,
                    |code, body| code.return_value(body, Expr::div(Expr::int(10), d.get())?),
                    TrySpec::new()
                        .catch(&["java.lang.RuntimeException"], |code, handler, _| {
                            code.return_value(handler, Expr::int(-1))
                        })
                        .catch(&["java.lang.ArithmeticException"], |code, handler, _| {
                            code.return_value(handler, Expr::int(-2))
                        }),
                )?;
                Ok(())
            },
        )
        .unwrap();
    maker
        .method(main_def(), |code, blk| {
            for d in [2, 0] {
                let result = code.invoke(&divide, None, vec![Expr::int(d)])?;
                print_int(code, blk, result)?;
            }
            Ok(())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Wide") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["5", "-1"]);
    }
}

#[test]
fn test_finally_runs_once_per_exit_path() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Exits");
    let runs = maker.add_field(FieldDef::new("runs", Type::int()).modifiers(Modifiers::STATIC)).unwrap();
    let bump = |code: &mut Code, blk: Block, runs: &classmaker::FieldRef| -> Result<()> {
        let next = Expr::add(Expr::get_static(runs)?, Expr::int(1))?;
        code.put_static(blk, runs, next)
    };
    maker
        .method(main_def(), |code, blk| {
            // break, continue and normal completion inside a loop
            let i = code.declare_init(blk, "i", Type::int(), Expr::int(0))?;
            let step = i.clone();
            code.for_(
                blk,
                Expr::lt(i.get(), Expr::int(5))?,
                move |code, s| code.inc(s, &step, Expr::int(1)),
                |code, body, lp| {
                    let i = i.clone();
                    code.try_(
                        body,
                        |code, t| {
                            code.if_(t, Expr::eq(i.get(), Expr::int(1))?, |code, then| code.continue_(then, lp))?;
                            code.if_(t, Expr::eq(i.get(), Expr::int(3))?, |code, then| code.break_(then, lp))?;
                            Ok(())
                        },
                        TrySpec::new().finally(|code, fin| bump(code, fin, &runs)),
                    )
                },
            )?;
            // i = 0 normal, 1 continue, 2 normal, 3 break
            print_int(code, blk, Expr::get_static(&runs)?)?;

            // thrown exception caught outside
            code.try_(
                blk,
                |code, outer| {
                    code.try_(
                        outer,
                        |code, inner| {
                            let ise = MethodRef::constructor("java/lang/IllegalStateException", vec![]);
                            let e = code.new_instance(&ise, vec![])?;
                            code.throw_(inner, e)
                        },
                        TrySpec::new().finally(|code, fin| bump(code, fin, &runs)),
                    )
                },
                TrySpec::new().catch(&["java.lang.IllegalStateException"], |_, _, _| Ok(())),
            )?;
            print_int(code, blk, Expr::get_static(&runs)?)
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Exits") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["4", "5"]);
    }
}

#[test]
fn test_exception_from_inner_finally_reaches_outer_handlers() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/NestedFinally");
    let runs = maker.add_field(FieldDef::new("runs", Type::int()).modifiers(Modifiers::STATIC)).unwrap();
    let throw_ise = |code: &mut Code, blk: Block| -> Result<()> {
        let ise = MethodRef::constructor("java/lang/IllegalStateException", vec![]);
        let e = code.new_instance(&ise, vec![])?;
        code.throw_(blk, e)
    };

    // try { try { return 1; } finally { throw } } catch (IllegalStateException e) { return 2; }
    let caught = maker
        .method(MethodDef::new("caught", Type::int()).modifiers(Modifiers::STATIC), |code, blk| {
            code.try_(
                blk,
                |code, outer| {
                    code.try_(
                        outer,
                        |code, inner| code.return_value(inner, Expr::int(1)),
                        TrySpec::new().finally(throw_ise),
                    )
                },
                TrySpec::new().catch(&["java.lang.IllegalStateException"], |code, handler, _| {
                    code.return_value(handler, Expr::int(2))
                }),
            )
        })
        .unwrap();

    // try { try { return; } finally { throw } } finally { runs++; }
    let rethrown = maker
        .method(MethodDef::new("rethrown", Type::void()).modifiers(Modifiers::STATIC), |code, blk| {
            let runs = runs.clone();
            code.try_(
                blk,
                |code, outer| code.try_(outer, |code, inner| code.return_void(inner), TrySpec::new().finally(throw_ise)),
                TrySpec::new().finally(move |code, fin| {
                    let next = Expr::add(Expr::get_static(&runs)?, Expr::int(1))?;
                    code.put_static(fin, &runs, next)
                }),
            )
        })
        .unwrap();

    // while (true) { try { try { break; } finally { throw } } catch (IllegalStateException e) { return 3; } }
    let broken = maker
        .method(MethodDef::new("broken", Type::int()).modifiers(Modifiers::STATIC), |code, blk| {
            code.loop_(blk, |code, body, lp| {
                code.try_(
                    body,
                    |code, outer| {
                        code.try_(outer, |code, inner| code.break_(inner, lp), TrySpec::new().finally(throw_ise))
                    },
                    TrySpec::new().catch(&["java.lang.IllegalStateException"], |code, handler, _| {
                        code.return_value(handler, Expr::int(3))
                    }),
                )
            })?;
            code.return_value(blk, Expr::int(0))
        })
        .unwrap();

    maker
        .method(main_def(), |code, blk| {
            let result = code.invoke(&caught, None, vec![])?;
            print_int(code, blk, result)?;
            code.try_(
                blk,
                |code, body| {
                    let call = code.invoke(&rethrown, None, vec![])?;
                    code.eval(body, call)
                },
                TrySpec::new().catch(&["java.lang.IllegalStateException"], |_, _, _| Ok(())),
            )?;
            print_int(code, blk, Expr::get_static(&runs)?)?;
            let result = code.invoke(&broken, None, vec![])?;
            print_int(code, blk, result)
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.NestedFinally") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["2", "1", "3"]);
    }
}

#[test]
fn test_finally_runs_on_redo() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Redo");
    maker
        .method(main_def(), |code, blk| {
            let runs = code.declare_init(blk, "runs", Type::int(), Expr::int(0))?;
            let redone = code.declare_init(blk, "redone", Type::boolean(), Expr::boolean(false))?;
            let i = code.declare_init(blk, "i", Type::int(), Expr::int(0))?;
            code.while_(blk, Expr::lt(i.get(), Expr::int(2))?, |code, body, lp| {
                code.try_(
                    body,
                    |code, t| {
                        let again = Expr::cond_and(Expr::not(redone.get())?, Expr::eq(i.get(), Expr::int(1))?)?;
                        code.if_(t, again, |code, then| {
                            code.set(then, &redone, Expr::boolean(true))?;
                            code.redo(then, lp)
                        })
                    },
                    TrySpec::new().finally(|code, fin| code.inc(fin, &runs, Expr::int(1))),
                )?;
                code.inc(body, &i, Expr::int(1))
            })?;
            // i = 0 once, i = 1 twice
            print_int(code, blk, runs.get())?;
            print_int(code, blk, i.get())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Redo") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["3", "2"]);
    }
}

#[test]
fn test_atomic_instance_field_at_each_order() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Cell");
    let value = maker.add_field(FieldDef::new("value", Type::int())).unwrap();
    let ctor = maker.default_constructor(Modifiers::PUBLIC).unwrap();
    maker
        .method(main_def(), |code, blk| {
            let created = code.new_instance(&ctor, vec![])?;
            let cell = code.declare_init(blk, "cell", Type::class("e2e/Cell"), created)?;
            let atomic = |code: &Code, op: AtomicOp, order: MemoryOrder, args: Vec<Expr>| -> Result<Expr> {
                let access = AtomicAccess::field(Some(cell.get()), &value)?;
                Expr::atomic(code.registry(), op, access, order, args)
            };

            code.put_field_ordered(blk, Some(cell.get()), &value, Expr::int(10), MemoryOrder::Release)?;
            let previous = atomic(code, AtomicOp::GetAndAdd, MemoryOrder::Acquire, vec![Expr::int(5)])?;
            print_int(code, blk, previous)?;
            let swapped = atomic(code, AtomicOp::CompareAndSet, MemoryOrder::Volatile, vec![Expr::int(15), Expr::int(20)])?;
            println(code, blk, swapped, Type::boolean())?;
            let stale = atomic(code, AtomicOp::CompareAndSet, MemoryOrder::Volatile, vec![Expr::int(15), Expr::int(30)])?;
            println(code, blk, stale, Type::boolean())?;
            let weak_miss = atomic(code, AtomicOp::WeakCompareAndSet, MemoryOrder::Acquire, vec![Expr::int(99), Expr::int(1)])?;
            println(code, blk, weak_miss, Type::boolean())?;
            let previous = atomic(code, AtomicOp::GetAndSet, MemoryOrder::Release, vec![Expr::int(7)])?;
            print_int(code, blk, previous)?;
            print_int(code, blk, Expr::field(Some(cell.get()), &value, MemoryOrder::Opaque)?)
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Cell") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["10", "true", "false", "false", "20", "7"]);
    }
}

#[test]
fn test_atomic_array_element_at_each_order() {
    init_logging();
    let mut maker = ClassMaker::new("e2e/Slots");
    maker
        .method(main_def(), |code, blk| {
            let longs = Type::array_of(Type::long());
            let created = Expr::new_array(longs.clone(), vec![Expr::int(3)])?;
            let arr = code.declare_init(blk, "arr", longs, created)?;
            let atomic = |code: &Code, op: AtomicOp, order: MemoryOrder, args: Vec<Expr>| -> Result<Expr> {
                let access = AtomicAccess::array(arr.get(), Expr::int(1))?;
                Expr::atomic(code.registry(), op, access, order, args)
            };

            code.array_store_ordered(blk, arr.get(), Expr::int(1), Expr::long(4), MemoryOrder::Opaque)?;
            let previous = atomic(code, AtomicOp::GetAndBitwiseOr, MemoryOrder::Release, vec![Expr::long(3)])?;
            println(code, blk, previous, Type::long())?;
            let current = Expr::array_elem_ordered(arr.get(), Expr::int(1), MemoryOrder::Acquire)?;
            println(code, blk, current, Type::long())?;
            let witness =
                atomic(code, AtomicOp::CompareAndExchange, MemoryOrder::Acquire, vec![Expr::long(7), Expr::long(9)])?;
            println(code, blk, witness, Type::long())?;
            let stale = atomic(code, AtomicOp::WeakCompareAndSet, MemoryOrder::Plain, vec![Expr::long(7), Expr::long(1)])?;
            println(code, blk, stale, Type::boolean())?;
            let swapped = atomic(code, AtomicOp::CompareAndSet, MemoryOrder::Opaque, vec![Expr::long(9), Expr::long(2)])?;
            println(code, blk, swapped, Type::boolean())?;
            let previous = atomic(code, AtomicOp::GetAndAdd, MemoryOrder::Volatile, vec![Expr::long(40)])?;
            println(code, blk, previous, Type::long())?;
            println(code, blk, Expr::array_elem(arr.get(), Expr::int(1))?, Type::long())
        })
        .unwrap();

    if let Some(out) = run(&mut maker, "e2e.Slots") {
        assert_eq!(out.lines().collect::<Vec<_>>(), ["4", "7", "7", "false", "true", "2", "42"]);
    }
}

#[test]
fn test_captures_visible_to_superclass_constructor() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    // class Base { Base() { System.out.println(describe()); } String describe() { return "base"; } }
    let mut base = ClassMaker::new("e2e/Base");
    let describe = base
        .method(MethodDef::new("describe", Type::string()).modifiers(Modifiers::PUBLIC), |code, blk| {
            code.return_value(blk, Expr::string("base"))
        })
        .unwrap();
    let base_ctor = base
        .constructor(MethodDef::constructor().modifiers(Modifiers::PUBLIC), |code, blk| {
            code.invoke_super_ctor(blk, vec![], vec![])?;
            let this = code.this(blk)?;
            let text = code.invoke(&describe, Some(this.get()), vec![])?;
            println(code, blk, text, Type::string())
        })
        .unwrap();
    base.finish_to(&mut DirectoryOutput::new(dir.path())).unwrap();

    let mut maker = ClassMaker::new("e2e/Derived");
    maker
        .method(main_def(), |code, blk| {
            let label = code.declare_init(blk, "label", Type::string(), Expr::string("captured"))?;
            let instance = code.anon_class(blk, AnonSpec::extending(base_ctor.clone()), vec![], |code, anon| {
                code.anon_method(anon, "describe", vec![], Type::string(), |code, body| {
                    code.return_value(body, label.get())
                })
            })?;
            code.eval(blk, instance)
        })
        .unwrap();
    maker.finish_to(&mut DirectoryOutput::new(dir.path())).unwrap();

    if let Some(out) = run_java(dir.path(), "e2e.Derived") {
        assert_eq!(out.trim(), "captured");
    }
}
