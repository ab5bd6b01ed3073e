#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rill::parser::Parser;
    use rill::value::Callable;
    use rill::{Interpreter, InterpreterConfig, RillError, Stmt, Value};

    /// Runs `source` and returns everything it printed plus the first error.
    fn run_capture(source: &str) -> (Vec<String>, Option<RillError>) {
        let output: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&output);

        let result = rill::run(source, move |line: &str| {
            sink.borrow_mut().push(line.to_string())
        });

        let lines = output.borrow().clone();
        (lines, result.err().and_then(|errors| errors.into_iter().next()))
    }

    fn run_ok(source: &str) -> Vec<String> {
        let (lines, error) = run_capture(source);
        if let Some(e) = error {
            panic!("unexpected error: {}", e);
        }
        lines
    }

    fn run_err(source: &str) -> (Vec<String>, RillError) {
        let (lines, error) = run_capture(source);
        (lines, error.expect("program should fail"))
    }

    fn parse_program(source: &str) -> Vec<Stmt> {
        rill::parse(rill::lex(source).unwrap()).unwrap()
    }

    /// An interpreter that keeps its printed lines in the returned buffer.
    fn capturing_interpreter() -> (Interpreter<'static>, Rc<RefCell<Vec<String>>>) {
        let output: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&output);

        let interpreter = Interpreter::with_output(move |line: &str| {
            sink.borrow_mut().push(line.to_string())
        });
        (interpreter, output)
    }

    #[test]
    fn test_no_print_no_output() {
        assert!(run_ok("var a = 1; { var b = a + 2; } fun f() {}").is_empty());
    }

    #[test]
    fn test_print_sum() {
        assert_eq!(run_ok("print 1 + 2;"), vec!["3"]);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(
            run_ok(
                "print 7 / 2; print 1 / 0; print -1 / 0; print nil; print true; \
                 print 'a' + 'b'; fun f() {} print f; print clock;"
            ),
            vec![
                "3.5",
                "Infinity",
                "-Infinity",
                "nil",
                "true",
                "\"ab\"",
                "<fn f>",
                "<native fn>"
            ]
        );
    }

    #[test]
    fn test_shadowing() {
        assert_eq!(
            run_ok("var x = 1; { var x = 2; print x; } print x;"),
            vec!["2", "1"]
        );
    }

    #[test]
    fn test_initializer_sees_enclosing_binding() {
        assert_eq!(
            run_ok("var a = 'outer'; { var a = a + '!'; print a; } print a;"),
            vec!["\"outer!\"", "\"outer\""]
        );
    }

    #[test]
    fn test_undefined_variable() {
        let (lines, err) = run_err("\n\nprint y;");

        assert!(lines.is_empty());
        assert!(err.is_runtime());
        assert_eq!(err.message(), "Undefined variable 'y'.");
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_assignment_never_creates_globals() {
        let (_, err) = run_err("z = 1;");
        assert_eq!(err.message(), "Undefined variable 'z'.");
    }

    #[test]
    fn test_closures_keep_independent_state() {
        let source = r#"
            fun makeCounter() {
                var i = 0;
                fun count() {
                    i = i + 1;
                    return i;
                }
                return count;
            }

            var a = makeCounter();
            var b = makeCounter();
            print a();
            print a();
            print b();
            print a();
        "#;

        assert_eq!(run_ok(source), vec!["1", "2", "1", "3"]);
    }

    #[test]
    fn test_closure_binding_is_lexical() {
        let source = r#"
            var a = 'global';
            {
                fun show() { print a; }
                show();
                var a = 'block';
                show();
            }
        "#;

        assert_eq!(run_ok(source), vec!["\"global\"", "\"global\""]);
    }

    #[test]
    fn test_recursion() {
        let source = r#"
            fun fib(n) {
                if (n < 2) return n;
                return fib(n - 1) + fib(n - 2);
            }
            print fib(15);
        "#;

        assert_eq!(run_ok(source), vec!["610"]);
    }

    #[test]
    fn test_truthiness_and_logic() {
        let source = r#"
            if (0) print 'zero';
            if ('') print 'empty';
            if (nil) print 'nil'; else print 'falsy';
            print nil or 'x';
            print 1 and nil;
            print false or false;
            print nil == false;
            print 'a' == 'a';
            print !nil;
        "#;

        assert_eq!(
            run_ok(source),
            vec![
                "\"zero\"", "\"empty\"", "\"falsy\"", "\"x\"", "nil", "false", "false", "true",
                "true"
            ]
        );
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        assert_eq!(
            run_ok(
                "var hit = false; fun f() { hit = true; return 1; } print true or f(); print hit;"
            ),
            vec!["true", "false"]
        );
    }

    #[test]
    fn test_operand_type_errors() {
        let cases = [
            ("print 1 + 'a';", "Operands must be two numbers or two strings."),
            ("print -'a';", "Operand must be a number."),
            ("print 1 < 'a';", "Operands must be numbers."),
            ("print nil * 2;", "Operands must be numbers."),
            ("'x'();", "Can only call functions and classes."),
        ];

        for (source, message) in cases {
            let (_, err) = run_err(source);
            assert_eq!(err.message(), message, "for {}", source);
        }
    }

    #[test]
    fn test_arity_mismatch() {
        let (_, err) = run_err("fun f() {}\nf(1);");

        assert_eq!(err.message(), "Expected 0 arguments but got 1.");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_loops_with_break_and_continue() {
        let source = r#"
            for (var i = 0; i < 10; i = i + 1) {
                if (i == 2) continue;
                if (i == 4) break;
                print i;
            }

            var n = 0;
            while (true) {
                n = n + 1;
                if (n > 3) break;
            }
            print n;
        "#;

        assert_eq!(run_ok(source), vec!["0", "1", "3", "4"]);
    }

    #[test]
    fn test_return_unwinds_loops() {
        assert_eq!(
            run_ok("fun f() { while (true) { for (;;) { return 7; } } } print f();"),
            vec!["7"]
        );
    }

    #[test]
    fn test_break_outside_loop() {
        let (lines, err) = run_err("print 1;\nbreak;");

        assert_eq!(lines, vec!["1"]);
        assert_eq!(err.message(), "Can't use 'break' outside of a loop.");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_break_does_not_cross_functions() {
        let (_, err) = run_err("while (true) {\n  fun f() { continue; }\n  f();\n}");

        assert_eq!(err.message(), "Can't use 'continue' outside of a loop.");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_return_outside_function() {
        let (_, err) = run_err("\nreturn 1;");

        assert_eq!(err.message(), "Can't return from top-level code.");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_interpret_is_repeatable() {
        let source = "var x = 0; for (var i = 0; i < 3; i = i + 1) x = x + i; print x;";
        let statements = rill::parse(rill::lex(source).unwrap()).unwrap();

        let mut outputs: Vec<Vec<String>> = Vec::new();
        for _ in 0..2 {
            let mut lines: Vec<String> = Vec::new();
            rill::interpret(&statements, |line: &str| lines.push(line.to_string())).unwrap();
            outputs.push(lines);
        }

        assert_eq!(outputs[0], vec!["3"]);
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_call_depth_limit() {
        let statements = parse_program("fun f() { f(); }\nf();");

        let mut interpreter = Interpreter::with_output(|_: &str| {})
            .with_config(InterpreterConfig { max_call_depth: 32 });

        let err = interpreter.interpret(&statements).unwrap_err();
        assert_eq!(err.message(), "Stack overflow.");
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_interrupt_hook_stops_execution() {
        let statements = parse_program("var i = 0;\nwhile (true) i = i + 1;");

        let mut interpreter = Interpreter::with_output(|_: &str| {});
        let mut polls = 0;
        interpreter.set_interrupt_hook(move || {
            polls += 1;
            polls > 100
        });

        let err = interpreter.interpret(&statements).unwrap_err();
        assert_eq!(err.message(), "Execution interrupted.");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_clock_is_native() {
        assert_eq!(run_ok("print clock() > 0;"), vec!["true"]);

        let (_, err) = run_err("clock(1);");
        assert_eq!(err.message(), "Expected 0 arguments but got 1.");
    }

    #[test]
    fn test_default_depth_fits_on_the_stack() {
        let source = "fun f(n) { if (n == 0) return 0; return f(n - 1) + 1; }\nprint f(250);";
        assert_eq!(run_ok(source), vec!["250"]);

        let (_, err) = run_err("fun f() { f(); }\nf();");
        assert_eq!(err.message(), "Stack overflow.");
    }

    #[test]
    fn test_deep_recursion_on_a_small_thread_stack() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let source = "fun f(n) { if (n < 1) return 0; return f(n - 1) + 1; }\nprint f(200);";
                let ok = run_ok(source);
                let (_, err) = run_err("fun f() { return f(); }\nf();");
                (ok, err.message())
            })
            .unwrap();

        let (ok, message) = handle.join().unwrap();
        assert_eq!(ok, vec!["200"]);
        assert_eq!(message, "Stack overflow.");
    }

    #[test]
    fn test_deeply_nested_source_parses_and_runs() {
        let source = format!("print {}1{};", "(".repeat(2000), ")".repeat(2000));
        assert_eq!(run_ok(&source), vec!["1"]);
    }

    #[test]
    fn test_interrupt_reports_literal_and_block_lines() {
        let mut interpreter = Interpreter::with_output(|_: &str| {});
        interpreter.set_interrupt_hook(|| true);

        let err = interpreter.interpret(&parse_program("\n\nprint 1;")).unwrap_err();
        assert_eq!(err.message(), "Execution interrupted.");
        assert_eq!(err.line(), Some(3));

        let err = interpreter.interpret(&parse_program("\n{\n}")).unwrap_err();
        assert_eq!(err.line(), Some(2));

        let err = interpreter.interpret(&parse_program("\n\n\nnil;")).unwrap_err();
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn test_state_is_restored_after_runtime_error() {
        let (interpreter, output) = capturing_interpreter();
        let mut interpreter = interpreter.with_config(InterpreterConfig { max_call_depth: 3 });

        let failing = "fun deep(n) { { var local = n; if (n == 2) missing; } deep(n + 1); }\n\
                       while (true) { deep(1); }";
        let err = interpreter.interpret(&parse_program(failing)).unwrap_err();
        assert_eq!(err.message(), "Undefined variable 'missing'.");
        assert_eq!(err.line(), Some(1));

        // Three nested calls only fit if the depth counter went back to zero.
        let source = "var late = 'ok';\n\
                      fun show() { print late; }\n\
                      fun a() { b(); } fun b() { show(); }\n\
                      for (var i = 0; i < 3; i = i + 1) { if (i == 1) continue; a(); }";
        interpreter.interpret(&parse_program(source)).unwrap();
        assert_eq!(*output.borrow(), vec!["\"ok\"", "\"ok\""]);

        let err = interpreter.interpret(&parse_program("print local;")).unwrap_err();
        assert_eq!(err.message(), "Undefined variable 'local'.");

        let err = interpreter.interpret(&parse_program("break;")).unwrap_err();
        assert_eq!(err.message(), "Can't use 'break' outside of a loop.");
    }

    #[test]
    fn test_discarded_closures_are_collected() {
        let (mut interpreter, output) = capturing_interpreter();

        let source = r#"
            fun makeCounter() {
                var n = 0;
                fun inc() { n = n + 1; return n; }
                return inc;
            }
            var kept = makeCounter();
            var i = 0;
            while (i < 3000) {
                var c = makeCounter();
                c();
                i = i + 1;
            }
            print kept();
            print kept();
        "#;

        interpreter.interpret(&parse_program(source)).unwrap();
        assert_eq!(*output.borrow(), vec!["1", "2"]);

        // Only the scope captured by `kept` is still reachable.
        assert_eq!(interpreter.live_scopes(), 1);
    }

    #[test]
    fn test_dropping_the_interpreter_frees_closures() {
        let mut interpreter = Interpreter::with_output(|_: &str| {});
        let source = "fun make() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }\n\
                      fun top() {}\n\
                      var counter = make();";
        interpreter.interpret(&parse_program(source)).unwrap();

        let mut captured = Vec::new();
        for name in ["top", "counter"] {
            let expr = Parser::new(rill::lex(name).unwrap()).parse_expression().unwrap();
            match interpreter.evaluate(&expr).unwrap() {
                Value::Callable(Callable::Function(function)) => {
                    captured.push(Rc::downgrade(&function.closure))
                }
                other => panic!("expected a function, got {}", other),
            }
        }
        assert!(captured.iter().all(|scope| scope.upgrade().is_some()));

        drop(interpreter);
        assert!(captured.iter().all(|scope| scope.upgrade().is_none()));
    }
}
