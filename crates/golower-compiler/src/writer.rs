//! JavaScript writer for the target IR.
//!
//! Binary and conditional expressions are always parenthesized, so the
//! writer never needs an operator precedence table. Minified output drops
//! indentation, line breaks and optional spaces; spaces around binary
//! operators are kept so `a - -b` can never fuse into `a--b`.

use crate::js::*;

/// Emits IR as JavaScript source code.
pub struct JsWriter {
    output: String,
    indent: usize,
    minify: bool,
}

impl JsWriter {
    pub fn new(minify: bool) -> Self {
        Self {
            output: String::new(),
            indent: 0,
            minify,
        }
    }

    /// Emit a program to JavaScript source.
    pub fn emit(program: &Program, minify: bool) -> String {
        let mut writer = Self::new(minify);
        writer.write_program(program);
        writer.output
    }

    /// Emit a single expression, mostly useful in tests.
    pub fn emit_expr(expr: &Expr) -> String {
        let mut writer = Self::new(false);
        writer.write_expr(expr);
        writer.output
    }

    fn write_program(&mut self, program: &Program) {
        for stmt in &program.body {
            self.write_stmt(stmt);
            self.newline();
        }
    }

    fn newline(&mut self) {
        if !self.minify {
            self.output.push('\n');
        }
    }

    fn write_indent(&mut self) {
        if self.minify {
            return;
        }
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
    }

    /// A space that only matters for readability.
    fn space(&mut self) {
        if !self.minify {
            self.output.push(' ');
        }
    }

    fn comma(&mut self) {
        self.output.push(',');
        self.space();
    }

    fn write_stmt(&mut self, stmt: &Stmt) {
        self.write_indent();
        self.write_stmt_no_indent(stmt);
    }

    fn write_stmt_no_indent(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => {
                match expr {
                    Expr::Yield { delegate, arg } => self.write_yield(*delegate, arg),
                    Expr::Function(_) | Expr::Object(_) => {
                        self.output.push('(');
                        self.write_expr(expr);
                        self.output.push(')');
                    }
                    _ => self.write_expr(expr),
                }
                self.output.push(';');
            }

            Stmt::Var { .. } | Stmt::Destructure { .. } => {
                self.write_stmt_inline(stmt);
                self.output.push(';');
            }

            Stmt::Block(stmts) => self.write_block(stmts),

            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.output.push_str("if");
                self.space();
                self.output.push('(');
                self.write_expr(test);
                self.output.push(')');
                self.space();
                self.write_body(consequent);
                if let Some(alt) = alternate {
                    self.space();
                    self.output.push_str("else");
                    if matches!(alt.as_ref(), Stmt::If { .. }) {
                        self.output.push(' ');
                        self.write_stmt_no_indent(alt);
                    } else {
                        self.space();
                        self.write_body(alt);
                    }
                }
            }

            Stmt::While { test, body } => {
                self.output.push_str("while");
                self.space();
                self.output.push('(');
                self.write_expr(test);
                self.output.push(')');
                self.space();
                self.write_body(body);
            }

            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                self.output.push_str("for");
                self.space();
                self.output.push('(');
                if let Some(init) = init {
                    self.write_stmt_inline(init);
                }
                self.output.push(';');
                if let Some(test) = test {
                    self.space();
                    self.write_expr(test);
                }
                self.output.push(';');
                if let Some(update) = update {
                    self.space();
                    self.write_expr(update);
                }
                self.output.push(')');
                self.space();
                self.write_body(body);
            }

            Stmt::ForOf {
                bindings,
                iterable,
                body,
            } => {
                self.output.push_str("for");
                self.space();
                self.output.push_str("(const ");
                self.write_bindings(bindings);
                self.output.push_str(" of ");
                self.write_expr(iterable);
                self.output.push(')');
                self.space();
                self.write_body(body);
            }

            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.output.push_str("switch");
                self.space();
                self.output.push('(');
                self.write_expr(discriminant);
                self.output.push(')');
                self.space();
                self.output.push('{');
                self.newline();
                self.indent += 1;
                for case in cases {
                    self.write_indent();
                    match &case.test {
                        Some(test) => {
                            self.output.push_str("case ");
                            self.write_expr(test);
                            self.output.push(':');
                        }
                        None => self.output.push_str("default:"),
                    }
                    self.newline();
                    self.indent += 1;
                    for s in &case.body {
                        self.write_stmt(s);
                        self.newline();
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.write_indent();
                self.output.push('}');
            }

            Stmt::Return(expr) => {
                self.output.push_str("return");
                if let Some(e) = expr {
                    self.output.push(' ');
                    self.write_expr(e);
                }
                self.output.push(';');
            }

            Stmt::Break(label) => self.write_jump("break", label.as_deref()),
            Stmt::Continue(label) => self.write_jump("continue", label.as_deref()),

            Stmt::Labeled { label, body } => {
                self.output.push_str(label);
                self.output.push(':');
                self.space();
                self.write_stmt_no_indent(body);
            }

            Stmt::TryCatch {
                body,
                catch_param,
                catch_body,
                finally_body,
            } => {
                self.output.push_str("try");
                self.space();
                self.write_body(body);
                if let Some(cb) = catch_body {
                    self.space();
                    self.output.push_str("catch");
                    if let Some(param) = catch_param {
                        self.space();
                        self.output.push('(');
                        self.output.push_str(param);
                        self.output.push(')');
                    }
                    self.space();
                    self.write_body(cb);
                }
                if let Some(fb) = finally_body {
                    self.space();
                    self.output.push_str("finally");
                    self.space();
                    self.write_body(fb);
                }
            }

            Stmt::Throw(expr) => {
                self.output.push_str("throw ");
                self.write_expr(expr);
                self.output.push(';');
            }

            Stmt::Function(f) => self.write_function(f),

            Stmt::Empty => self.output.push(';'),
        }
    }

    /// Declarations without the trailing semicolon, as in a `for` head.
    fn write_stmt_inline(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var { kind, name, init } => {
                self.output.push_str(kind.as_str());
                self.output.push(' ');
                self.output.push_str(name);
                if let Some(init) = init {
                    self.write_assign_op();
                    self.write_expr(init);
                }
            }
            Stmt::Destructure { kind, names, init } => {
                self.output.push_str(kind.as_str());
                self.output.push(' ');
                self.write_bindings(names);
                self.write_assign_op();
                self.write_expr(init);
            }
            Stmt::Expr(expr) => self.write_expr(expr),
            _ => {}
        }
    }

    fn write_bindings(&mut self, names: &[String]) {
        if let [single] = names {
            self.output.push_str(single);
            return;
        }
        self.output.push('[');
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.comma();
            }
            self.output.push_str(name);
        }
        self.output.push(']');
    }

    fn write_assign_op(&mut self) {
        self.space();
        self.output.push('=');
        self.space();
    }

    fn write_jump(&mut self, keyword: &str, label: Option<&str>) {
        self.output.push_str(keyword);
        if let Some(label) = label {
            self.output.push(' ');
            self.output.push_str(label);
        }
        self.output.push(';');
    }

    fn write_block(&mut self, stmts: &[Stmt]) {
        if stmts.is_empty() {
            self.output.push_str("{}");
            return;
        }
        self.output.push('{');
        self.newline();
        self.indent += 1;
        for s in stmts {
            self.write_stmt(s);
            self.newline();
        }
        self.indent -= 1;
        self.write_indent();
        self.output.push('}');
    }

    fn write_body(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => self.write_block(stmts),
            other => self.write_block(std::slice::from_ref(other)),
        }
    }

    fn write_params(&mut self, params: &[String]) {
        self.output.push('(');
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.comma();
            }
            self.output.push_str(param);
        }
        self.output.push(')');
    }

    fn write_function(&mut self, f: &Function) {
        if f.arrow && !f.generator {
            self.write_params(&f.params);
            self.space();
            self.output.push_str("=>");
            self.space();
            // A lone return can be the expression body.
            if let [Stmt::Return(Some(expr))] = f.body.as_slice() {
                if matches!(expr, Expr::Object(_)) {
                    self.output.push('(');
                    self.write_expr(expr);
                    self.output.push(')');
                } else {
                    self.write_expr(expr);
                }
                return;
            }
            self.write_block(&f.body);
            return;
        }
        self.output.push_str("function");
        if f.generator {
            self.output.push('*');
        }
        if !f.name.is_empty() {
            self.output.push(' ');
            self.output.push_str(&f.name);
        }
        self.write_params(&f.params);
        self.space();
        self.write_block(&f.body);
    }

    fn write_yield(&mut self, delegate: bool, arg: &Expr) {
        self.output.push_str(if delegate { "yield* " } else { "yield " });
        self.write_expr(arg);
    }

    /// Write `expr` where a primary expression is required, such as a callee
    /// or the object of a member access.
    fn write_operand(&mut self, expr: &Expr) {
        if is_primary(expr) {
            self.write_expr(expr);
        } else {
            self.output.push('(');
            self.write_expr(expr);
            self.output.push(')');
        }
    }

    fn write_args(&mut self, args: &[Expr]) {
        self.output.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.comma();
            }
            self.write_expr(arg);
        }
        self.output.push(')');
    }

    fn write_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(lit) => self.write_literal(lit),

            Expr::Ident(name) => self.output.push_str(name),

            Expr::Binary { left, op, right } => {
                self.output.push('(');
                self.write_expr(left);
                self.output.push(' ');
                self.output.push_str(op.as_str());
                self.output.push(' ');
                self.write_expr(right);
                self.output.push(')');
            }

            Expr::Unary { op, expr } => {
                self.output.push_str(match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                    UnaryOp::TypeOf => "typeof ",
                });
                self.write_operand(expr);
            }

            Expr::Call { callee, args } => {
                self.write_operand(callee);
                self.write_args(args);
            }

            Expr::New { callee, args } => {
                self.output.push_str("new ");
                match callee.as_ref() {
                    Expr::Ident(_) | Expr::Member { .. } => self.write_expr(callee),
                    other => {
                        self.output.push('(');
                        self.write_expr(other);
                        self.output.push(')');
                    }
                }
                self.write_args(args);
            }

            Expr::Member { object, property } => {
                self.write_operand(object);
                self.output.push('.');
                self.output.push_str(property);
            }

            Expr::Index { object, index } => {
                self.write_operand(object);
                self.output.push('[');
                self.write_expr(index);
                self.output.push(']');
            }

            Expr::Array(items) => {
                self.output.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.comma();
                    }
                    self.write_expr(item);
                }
                self.output.push(']');
            }

            Expr::Object(pairs) => {
                if pairs.is_empty() {
                    self.output.push_str("{}");
                    return;
                }
                self.output.push('{');
                self.space();
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        self.comma();
                    }
                    if is_valid_identifier(key) {
                        self.output.push_str(key);
                    } else {
                        self.write_string(key);
                    }
                    self.output.push(':');
                    self.space();
                    self.write_expr(value);
                }
                self.space();
                self.output.push('}');
            }

            Expr::Function(f) => self.write_function(f),

            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.output.push('(');
                self.write_expr(test);
                self.output.push_str(" ? ");
                self.write_expr(consequent);
                self.output.push_str(" : ");
                self.write_expr(alternate);
                self.output.push(')');
            }

            Expr::Assign { target, value } => {
                self.write_expr(target);
                self.write_assign_op();
                self.write_expr(value);
            }

            Expr::Yield { delegate, arg } => {
                self.output.push('(');
                self.write_yield(*delegate, arg);
                self.output.push(')');
            }

            Expr::Spread(inner) => {
                self.output.push_str("...");
                self.write_operand(inner);
            }

            Expr::Sequence(items) => {
                self.output.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.comma();
                    }
                    self.write_expr(item);
                }
                self.output.push(')');
            }
        }
    }

    fn write_literal(&mut self, lit: &Literal) {
        match lit {
            Literal::Null => self.output.push_str("null"),
            Literal::Undefined => self.output.push_str("undefined"),
            Literal::Bool(b) => self.output.push_str(if *b { "true" } else { "false" }),
            Literal::Number(n) => self.output.push_str(&format_number(*n)),
            Literal::String(s) => self.write_string(s),
        }
    }

    fn write_string(&mut self, s: &str) {
        self.output.push('"');
        self.output.push_str(&escape_string(s));
        self.output.push('"');
    }
}

impl Default for JsWriter {
    fn default() -> Self {
        Self::new(false)
    }
}

fn is_primary(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(Literal::Number(n)) => !n.is_sign_negative() && n.is_finite(),
        Expr::Literal(_)
        | Expr::Ident(_)
        | Expr::Member { .. }
        | Expr::Index { .. }
        | Expr::Call { .. }
        | Expr::New { .. }
        | Expr::Array(_)
        | Expr::Binary { .. }
        | Expr::Conditional { .. }
        | Expr::Yield { .. }
        | Expr::Sequence(_) => true,
        _ => false,
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{2028}' || c == '\u{2029}' || c == '\u{7f}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit(stmts: Vec<Stmt>) -> String {
        JsWriter::emit(&Program::new(stmts), false)
    }

    #[test]
    fn test_simple_const() {
        let js = emit(vec![Stmt::const_decl("x", Expr::number(42))]);
        assert_eq!(js.trim(), "const x = 42;");
    }

    #[test]
    fn test_function_call() {
        let js = emit(vec![Stmt::expr(Expr::call(
            Expr::member(Expr::ident("console"), "log"),
            vec![Expr::string("hello")],
        ))]);
        assert_eq!(js.trim(), "console.log(\"hello\");");
    }

    #[test]
    fn test_binary_expr_is_parenthesized() {
        let js = emit(vec![Stmt::const_decl(
            "sum",
            Expr::binary(
                Expr::binary(Expr::ident("a"), BinaryOp::Add, Expr::ident("b")),
                BinaryOp::BitOr,
                Expr::number(0),
            ),
        )]);
        assert_eq!(js.trim(), "const sum = ((a + b) | 0);");
    }

    #[test]
    fn test_negative_operands() {
        let neg = Expr::unary(UnaryOp::Neg, Expr::number(-1));
        assert_eq!(JsWriter::emit_expr(&neg), "-(-1)");
        let sub = Expr::binary(Expr::ident("a"), BinaryOp::Sub, Expr::number(-1));
        let program = Program::new(vec![Stmt::expr(sub)]);
        assert_eq!(JsWriter::emit(&program, true), "(a - -1);");
        let member = Expr::member(Expr::number(-2), "toString");
        assert_eq!(JsWriter::emit_expr(&member), "(-2).toString");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-0.0), "-0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(4294967295.0), "4294967295");
    }

    #[test]
    fn test_string_escapes() {
        let js = JsWriter::emit_expr(&Expr::string("a\"b\\c\n\u{1}\u{2028}"));
        assert_eq!(js, r#""a\"b\\c\n\u0001\u2028""#);
    }

    #[test]
    fn test_generator_and_yield() {
        let f = Function::new(
            "recvOne",
            vec!["ch".into()],
            vec![Stmt::return_stmt(Some(Expr::index(
                Expr::yield_star(Expr::helper("$recv", vec![Expr::ident("ch")])),
                Expr::number(0),
            )))],
        )
        .generator(true);
        let js = emit(vec![Stmt::Function(f)]);
        insta::assert_snapshot!(js.trim_end(), @r"
        function* recvOne(ch) {
          return (yield* $recv(ch))[0];
        }
        ");
    }

    #[test]
    fn test_yield_statement_has_no_parens() {
        let js = emit(vec![Stmt::expr(Expr::yield_star(Expr::helper(
            "$send",
            vec![Expr::ident("ch"), Expr::number(1)],
        )))]);
        assert_eq!(js.trim(), "yield* $send(ch, 1);");
    }

    #[test]
    fn test_arrow_expression_body() {
        let thunk = Expr::thunk(Expr::object(vec![("x".into(), Expr::number(0))]));
        assert_eq!(JsWriter::emit_expr(&thunk), "() => ({ x: 0 })");
    }

    #[test]
    fn test_if_else_chain() {
        let js = emit(vec![Stmt::if_stmt(
            Expr::ident("a"),
            Stmt::return_stmt(Some(Expr::number(1))),
            Some(Stmt::if_stmt(
                Expr::ident("b"),
                Stmt::return_stmt(Some(Expr::number(2))),
                Some(Stmt::block(vec![Stmt::return_stmt(None)])),
            )),
        )]);
        insta::assert_snapshot!(js.trim_end(), @r"
        if (a) {
          return 1;
        } else if (b) {
          return 2;
        } else {
          return;
        }
        ");
    }

    #[test]
    fn test_switch_and_labels() {
        let js = emit(vec![Stmt::labeled(
            "outer",
            Stmt::Switch {
                discriminant: Expr::bool(true),
                cases: vec![
                    SwitchCase {
                        test: Some(Expr::ident("x")),
                        body: vec![Stmt::Break(Some("outer".into()))],
                    },
                    SwitchCase {
                        test: None,
                        body: vec![Stmt::Break(None)],
                    },
                ],
            },
        )]);
        insta::assert_snapshot!(js.trim_end(), @r"
        outer: switch (true) {
          case x:
            break outer;
          default:
            break;
        }
        ");
    }

    #[test]
    fn test_for_loop_and_for_of() {
        let js = emit(vec![
            Stmt::for_loop(
                Some(Stmt::let_decl("i", Some(Expr::number(0)))),
                Some(Expr::binary(Expr::ident("i"), BinaryOp::Lt, Expr::number(10))),
                Some(Expr::assign(
                    Expr::ident("i"),
                    Expr::binary(Expr::ident("i"), BinaryOp::Add, Expr::number(1)),
                )),
                Stmt::block(vec![]),
            ),
            Stmt::ForOf {
                bindings: vec!["k".into(), "v".into()],
                iterable: Expr::helper("$mapEntries", vec![Expr::ident("m")]),
                body: Box::new(Stmt::block(vec![])),
            },
        ]);
        assert!(js.contains("for (let i = 0; (i < 10); i = (i + 1)) {}"));
        assert!(js.contains("for (const [k, v] of $mapEntries(m)) {}"));
    }

    #[test]
    fn test_minify_drops_layout() {
        let program = Program::new(vec![Stmt::Function(Function::new(
            "f",
            vec!["a".into(), "b".into()],
            vec![
                Stmt::let_decl("x", Some(Expr::array(vec![Expr::ident("a"), Expr::ident("b")]))),
                Stmt::TryCatch {
                    body: Box::new(Stmt::block(vec![Stmt::return_stmt(Some(Expr::ident("x")))])),
                    catch_param: Some("e".into()),
                    catch_body: Some(Box::new(Stmt::block(vec![Stmt::throw(Expr::ident("e"))]))),
                    finally_body: None,
                },
            ],
        ))]);
        assert_eq!(
            JsWriter::emit(&program, true),
            "function f(a,b){let x=[a,b];try{return x;}catch(e){throw e;}}"
        );
    }

    #[test]
    fn test_function_expression_statement_is_wrapped() {
        let iife = Expr::call(Expr::function(Function::anonymous(vec![], vec![])), vec![]);
        let js = emit(vec![Stmt::expr(iife)]);
        assert_eq!(js.trim(), "(function() {})();");
    }
}
