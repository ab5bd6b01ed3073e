#[cfg(test)]
mod parser_tests {
    use rill::ast_printer::AstPrinter;
    use rill::parser::Parser;
    use rill::stmt::Stmt;
    use rill::RillError;

    fn parse_source(source: &str) -> Result<Vec<Stmt>, Vec<RillError>> {
        rill::parse(rill::lex(source).expect("source should lex"))
    }

    fn printed(source: &str) -> Vec<String> {
        parse_source(source)
            .expect("source should parse")
            .iter()
            .map(AstPrinter::print_stmt)
            .collect()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            printed("print 1 + 2 * 3 - -4;"),
            vec!["(print (- (+ 1.0 (* 2.0 3.0)) (- 4.0)))"]
        );
        assert_eq!(
            printed("!(1 >= 2) == true;"),
            vec!["(; (== (! (group (>= 1.0 2.0))) true))"]
        );
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(printed("a or b and c;"), vec!["(; (or a (and b c)))"]);
    }

    #[test]
    fn test_assignment_is_right_associative() {
        assert_eq!(printed("a = b = 1;"), vec!["(; (= a (= b 1.0)))"]);
        assert_eq!(
            printed("obj.field = 'v';"),
            vec!["(; (= (. obj field) v))"]
        );
    }

    #[test]
    fn test_invalid_assignment_target() {
        let errors = parse_source("var a;\n1 + a = 2;").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "Invalid assignment target");
        assert_eq!(errors[0].line(), Some(2));
    }

    #[test]
    fn test_for_desugars_to_while() {
        assert_eq!(
            printed("for (var i = 0; i < 3; i = i + 1) print i;"),
            vec!["(block (var i 0.0) (while (< i 3.0) (print i) (= i (+ i 1.0))))"]
        );
        assert_eq!(printed("for (;;) break;"), vec!["(while true (break))"]);
    }

    #[test]
    fn test_declarations() {
        assert_eq!(
            printed("fun add(a, b) { return a + b; }"),
            vec!["(fun add (a b) (return (+ a b)))"]
        );
        assert_eq!(
            printed("class B < A { init(x) { this.x = x; } go() { super.go(); } }"),
            vec![concat!(
                "(class B < A (method init (x) (; (= (. this x) x))) ",
                "(method go () (; (call (super go)))))"
            )]
        );
        assert_eq!(
            printed("if (x) print 1; else { var y; }"),
            vec!["(if x (print 1.0) (block (var y)))"]
        );
    }

    #[test]
    fn test_errors_recover_per_statement() {
        let errors = parse_source("var = 1;\nprint 2;\nvar x = ;\nprint 3;").unwrap_err();

        let lines: Vec<Option<usize>> = errors.iter().map(RillError::line).collect();
        assert_eq!(lines, vec![Some(1), Some(3)]);
        assert_eq!(errors[0].message(), "Expected variable name");
        assert_eq!(errors[1].message(), "Expected expression, found ';'");
    }

    #[test]
    fn test_missing_semicolon() {
        let errors = parse_source("print 1\nprint 2;").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "Expected ';' after value");
        assert_eq!(errors[0].line(), Some(2));
    }

    #[test]
    fn test_argument_limit() {
        let args: Vec<&str> = vec!["1"; 256];
        let source = format!("f({});", args.join(", "));

        let errors = parse_source(&source).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "Can't have more than 255 arguments.");
    }

    #[test]
    fn test_parameter_limit_keeps_parsing_the_declaration() {
        let params: Vec<String> = (0..256).map(|i| format!("a{}", i)).collect();
        let source = format!("fun f({}) {{\nvar = 1;\n}}", params.join(", "));

        let errors = parse_source(&source).unwrap_err();
        let messages: Vec<String> = errors.iter().map(RillError::message).collect();
        assert_eq!(
            messages,
            vec!["Can't have more than 255 parameters.", "Expected variable name"]
        );
        assert_eq!(errors[1].line(), Some(2));
    }

    #[test]
    fn test_literals_and_blocks_carry_lines() {
        let statements = parse_source("\n\nprint nil;\n{\n}\nfor (;;) break;").unwrap();

        let lines: Vec<usize> = statements.iter().map(Stmt::line).collect();
        assert_eq!(lines, vec![3, 4, 6]);

        match &statements[0] {
            Stmt::Print(expr) => assert_eq!(expr.line(), 3),
            other => panic!("expected print, got {}", AstPrinter::print_stmt(other)),
        }
    }

    #[test]
    fn test_parse_single_expression() {
        let tokens = rill::lex("(1 + 2) * x").unwrap();
        let expr = Parser::new(tokens).parse_expression().unwrap();
        assert_eq!(AstPrinter::print(&expr), "(* (group (+ 1.0 2.0)) x)");

        let tokens = rill::lex("1 2").unwrap();
        assert!(Parser::new(tokens).parse_expression().is_err());
    }

    #[test]
    fn test_statements_serialize_to_json() {
        let statements = parse_source("print 'hi';").unwrap();
        let json = serde_json::to_string(&statements).unwrap();

        assert!(json.contains("\"Print\""));
        assert!(json.contains("\"hi\""));
    }
}
