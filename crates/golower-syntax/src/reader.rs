//! Tree-sitter based Go reader.

use tree_sitter::{Node, Parser};

use crate::ast::*;
use crate::directive::{self, Directive};
use crate::error::{ParseError, ParseErrors};
use crate::lit;

/// Parse one Go source file.
pub fn parse_file(path: &str, source: &str) -> Result<File, ParseErrors> {
    let mut parser = Parser::new();
    parser
        .set_language(&arborium_go::language().into())
        .map_err(|err| ParseError::new(path, Pos::default(), err.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::new(path, Pos::default(), "failed to parse"))?;

    let mut ctx = ReadContext::new(path, source);
    let root = tree.root_node();
    ctx.collect_syntax_errors(root);
    if !ctx.errors.is_empty() {
        return Err(ParseErrors(ctx.errors));
    }
    let file = ctx.read_file(root);
    if ctx.errors.is_empty() {
        Ok(file)
    } else {
        Err(ParseErrors(ctx.errors))
    }
}

/// Parse every file of a package, reporting the errors of all files together.
pub fn parse_package<'a, I>(files: I) -> Result<Vec<File>, ParseErrors>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut parsed = Vec::new();
    let mut errors = ParseErrors::default();
    for (path, source) in files {
        match parse_file(path, source) {
            Ok(file) => parsed.push(file),
            Err(errs) => errors.extend(errs),
        }
    }
    if errors.is_empty() {
        Ok(parsed)
    } else {
        Err(errors)
    }
}

fn named<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

fn fields<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| !c.is_named() && c.kind() == token);
    found
}

/// Directive comments waiting for the declaration that follows them.
#[derive(Default)]
struct PendingDirectives {
    directives: Vec<Directive>,
    end_row: Option<usize>,
}

impl PendingDirectives {
    /// Directives apply only when the comment block touches the declaration.
    fn take_for(&mut self, node: Node<'_>) -> Vec<Directive> {
        let row = node.start_position().row;
        let attached = self.end_row.is_some_and(|end| end + 1 == row);
        let directives = std::mem::take(&mut self.directives);
        self.end_row = None;
        if attached { directives } else { Vec::new() }
    }
}

struct ReadContext<'a> {
    path: &'a str,
    source: &'a str,
    errors: Vec<ParseError>,
}

impl<'a> ReadContext<'a> {
    fn new(path: &'a str, source: &'a str) -> Self {
        Self {
            path,
            source,
            errors: Vec::new(),
        }
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn pos(&self, node: Node<'_>) -> Pos {
        let p = node.start_position();
        Pos::new(p.row as u32 + 1, p.column as u32 + 1)
    }

    fn error(&mut self, node: Node<'_>, message: impl Into<String>) {
        let pos = self.pos(node);
        self.errors.push(ParseError::new(self.path, pos, message));
    }

    fn collect_syntax_errors(&mut self, node: Node<'_>) {
        if node.is_error() {
            let snippet: String = self.text(node).chars().take(24).collect();
            self.error(node, format!("syntax error near {:?}", snippet.trim()));
            return;
        }
        if node.is_missing() {
            self.error(node, format!("missing {}", node.kind()));
            return;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            for child in children {
                self.collect_syntax_errors(child);
            }
        }
    }

    /// Record a directive comment into `pending`.
    fn comment(&mut self, node: Node<'_>, pending: &mut PendingDirectives) {
        let start = node.start_position().row;
        if pending.end_row.is_some_and(|end| end + 1 != start) {
            pending.directives.clear();
        }
        pending.end_row = Some(node.end_position().row);
        match directive::parse_comment(self.text(node)) {
            Some(Ok(d)) => pending.directives.push(d),
            Some(Err(kind)) => self.error(node, format!("unknown directive {kind:?}")),
            None => {}
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn read_file(&mut self, root: Node<'_>) -> File {
        let mut file = File {
            path: self.path.to_string(),
            package: String::new(),
            imports: Vec::new(),
            decls: Vec::new(),
        };
        let mut pending = PendingDirectives::default();
        let mut cursor = root.walk();
        let children: Vec<_> = root.named_children(&mut cursor).collect();
        for child in children {
            if child.kind() == "comment" {
                self.comment(child, &mut pending);
                continue;
            }
            let directives = pending.take_for(child);
            match child.kind() {
                "package_clause" => {
                    if let Some(name) = named(child).first() {
                        file.package = self.text(*name).to_string();
                    }
                }
                "import_declaration" => self.read_imports(child, &mut file.imports),
                "function_declaration" | "method_declaration" => {
                    let func = self.read_func(child, directives);
                    file.decls.push(Decl::Func(func));
                }
                "type_declaration" | "var_declaration" | "const_declaration" => {
                    self.read_gen_decl(child, directives, &mut file.decls);
                }
                other => self.error(child, format!("unexpected top-level {other}")),
            }
        }
        if file.package.is_empty() {
            self.error(root, "missing package clause");
        }
        file
    }

    fn read_imports(&mut self, node: Node<'_>, out: &mut Vec<ImportSpec>) {
        for child in named(node) {
            match child.kind() {
                "import_spec" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string());
                    let Some(path_node) = child.child_by_field_name("path") else {
                        self.error(child, "import is missing its path");
                        continue;
                    };
                    match lit::unquote_string(self.text(path_node)) {
                        Ok(path) => out.push(ImportSpec {
                            name,
                            path,
                            pos: self.pos(child),
                        }),
                        Err(msg) => self.error(path_node, msg),
                    }
                }
                "import_spec_list" => self.read_imports(child, out),
                _ => {}
            }
        }
    }

    fn read_func(&mut self, node: Node<'_>, directives: Vec<Directive>) -> FuncDecl {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let recv = node
            .child_by_field_name("receiver")
            .and_then(|r| self.read_receiver(r));
        let type_params = node
            .child_by_field_name("type_parameters")
            .map(|tp| self.read_type_params(tp))
            .unwrap_or_default();
        let sig = self.read_signature(node);
        let body = node
            .child_by_field_name("body")
            .map(|b| self.read_stmt_list(b));
        FuncDecl {
            recv,
            name,
            type_params,
            sig,
            body,
            directives,
            pos: self.pos(node),
        }
    }

    fn read_receiver(&mut self, list: Node<'_>) -> Option<Receiver> {
        let Some(param) = named(list).into_iter().next() else {
            self.error(list, "method has no receiver");
            return None;
        };
        let name = param
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string());
        let mut ty = param.child_by_field_name("type")?;
        let mut pointer = false;
        loop {
            match ty.kind() {
                "parenthesized_type" => ty = *named(ty).first()?,
                "pointer_type" => {
                    pointer = true;
                    ty = *named(ty).first()?;
                }
                _ => break,
            }
        }
        let mut type_args = Vec::new();
        if ty.kind() == "generic_type" {
            if let Some(args) = ty.child_by_field_name("type_arguments") {
                type_args = named(args).iter().map(|a| self.text(*a).to_string()).collect();
            }
            ty = ty.child_by_field_name("type")?;
        }
        Some(Receiver {
            name,
            type_name: self.text(ty).to_string(),
            pointer,
            type_args,
        })
    }

    fn read_type_params(&mut self, list: Node<'_>) -> Vec<String> {
        let mut names = Vec::new();
        for decl in named(list) {
            for name in fields(decl, "name") {
                names.push(self.text(name).to_string());
            }
        }
        names
    }

    /// Read the `parameters` and `result` fields of a function-like node.
    fn read_signature(&mut self, node: Node<'_>) -> Signature {
        let (params, variadic) = match node.child_by_field_name("parameters") {
            Some(list) => self.read_params(list),
            None => (Vec::new(), false),
        };
        let results = match node.child_by_field_name("result") {
            Some(r) if r.kind() == "parameter_list" => self.read_params(r).0,
            Some(r) => vec![Field::unnamed(self.read_type(r))],
            None => Vec::new(),
        };
        Signature {
            params,
            results,
            variadic,
        }
    }

    fn read_params(&mut self, list: Node<'_>) -> (Vec<Field>, bool) {
        let mut params = Vec::new();
        let mut variadic = false;
        for decl in named(list) {
            let ty = self.type_field(decl, "type");
            let names = fields(decl, "name");
            if decl.kind() == "variadic_parameter_declaration" {
                variadic = true;
            }
            if names.is_empty() {
                params.push(Field::unnamed(ty));
            } else {
                for name in names {
                    params.push(Field::named(self.text(name), ty.clone()));
                }
            }
        }
        (params, variadic)
    }

    fn read_gen_decl(&mut self, node: Node<'_>, outer: Vec<Directive>, out: &mut Vec<Decl>) {
        let mut specs = Vec::new();
        collect_specs(node, &mut specs);

        let mut pending = PendingDirectives::default();
        let mut iota = 0u32;
        let mut prev_const: Option<(Option<TypeExpr>, Vec<Expr>)> = None;
        for spec in specs {
            if spec.kind() == "comment" {
                self.comment(spec, &mut pending);
                continue;
            }
            let mut directives = outer.clone();
            directives.extend(pending.take_for(spec));
            match spec.kind() {
                "type_spec" | "type_alias" => {
                    let name = spec
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let type_params = spec
                        .child_by_field_name("type_parameters")
                        .map(|tp| self.read_type_params(tp))
                        .unwrap_or_default();
                    let ty = self.type_field(spec, "type");
                    out.push(Decl::Type(TypeSpec {
                        name,
                        type_params,
                        alias: spec.kind() == "type_alias",
                        ty,
                        directives,
                        pos: self.pos(spec),
                    }));
                }
                "var_spec" | "const_spec" => {
                    let names = fields(spec, "name")
                        .into_iter()
                        .map(|n| self.text(n).to_string())
                        .collect();
                    let mut ty = spec.child_by_field_name("type").map(|t| self.read_type(t));
                    let mut values = spec
                        .child_by_field_name("value")
                        .map(|v| self.read_expr_list(v))
                        .unwrap_or_default();
                    let mut value_spec = ValueSpec {
                        names,
                        ty: None,
                        values: Vec::new(),
                        iota: 0,
                        directives,
                        pos: self.pos(spec),
                    };
                    if spec.kind() == "const_spec" {
                        // An omitted expression list repeats the previous one.
                        if values.is_empty() && ty.is_none() {
                            if let Some((prev_ty, prev_values)) = &prev_const {
                                ty = prev_ty.clone();
                                values = prev_values.clone();
                            }
                        } else {
                            prev_const = Some((ty.clone(), values.clone()));
                        }
                        value_spec.iota = iota;
                        iota += 1;
                        value_spec.ty = ty;
                        value_spec.values = values;
                        out.push(Decl::Const(value_spec));
                    } else {
                        value_spec.ty = ty;
                        value_spec.values = values;
                        out.push(Decl::Var(value_spec));
                    }
                }
                other => self.error(spec, format!("unexpected {other} in declaration")),
            }
        }
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn type_field(&mut self, node: Node<'_>, field: &str) -> TypeExpr {
        match node.child_by_field_name(field) {
            Some(t) => self.read_type(t),
            None => {
                self.error(node, format!("{} is missing its {field}", node.kind()));
                TypeExpr::name("_")
            }
        }
    }

    fn first_type(&mut self, node: Node<'_>) -> TypeExpr {
        match named(node).first() {
            Some(inner) => self.read_type(*inner),
            None => {
                self.error(node, format!("empty {}", node.kind()));
                TypeExpr::name("_")
            }
        }
    }

    fn read_type(&mut self, node: Node<'_>) -> TypeExpr {
        match node.kind() {
            "type_identifier" | "identifier" => TypeExpr::name(self.text(node)),
            "qualified_type" | "selector_expression" => {
                let (pkg, name) = match node.kind() {
                    "qualified_type" => ("package", "name"),
                    _ => ("operand", "field"),
                };
                let pkg = node.child_by_field_name(pkg).map(|n| self.text(n));
                let name = node.child_by_field_name(name).map(|n| self.text(n));
                match (pkg, name) {
                    (Some(pkg), Some(name)) => TypeExpr::qualified(pkg, name),
                    _ => {
                        self.error(node, "malformed qualified type");
                        TypeExpr::name("_")
                    }
                }
            }
            "generic_type" => {
                let mut base = self.type_field(node, "type");
                let args = node
                    .child_by_field_name("type_arguments")
                    .map(|a| named(a).into_iter().map(|t| self.read_type(t)).collect())
                    .unwrap_or_default();
                if let TypeExpr::Name { args: slot, .. } = &mut base {
                    *slot = args;
                }
                base
            }
            "pointer_type" => TypeExpr::pointer(self.first_type(node)),
            "slice_type" => TypeExpr::slice(self.type_field(node, "element")),
            "array_type" => {
                let len = node
                    .child_by_field_name("length")
                    .map(|l| Box::new(self.read_expr(l)));
                TypeExpr::Array {
                    len,
                    elem: Box::new(self.type_field(node, "element")),
                }
            }
            "implicit_length_array_type" => TypeExpr::Array {
                len: None,
                elem: Box::new(self.type_field(node, "element")),
            },
            "map_type" => TypeExpr::Map {
                key: Box::new(self.type_field(node, "key")),
                value: Box::new(self.type_field(node, "value")),
            },
            "channel_type" => {
                let mut cursor = node.walk();
                let tokens: Vec<&str> = node
                    .children(&mut cursor)
                    .filter(|c| !c.is_named())
                    .map(|c| c.kind())
                    .take(2)
                    .collect();
                let dir = match tokens.as_slice() {
                    ["<-", ..] => ChanDir::Recv,
                    [_, "<-"] => ChanDir::Send,
                    _ => ChanDir::Both,
                };
                TypeExpr::Chan {
                    dir,
                    elem: Box::new(self.type_field(node, "value")),
                }
            }
            "function_type" => TypeExpr::Func(self.read_signature(node)),
            "struct_type" => {
                let mut out = Vec::new();
                for list in named(node) {
                    for decl in named(list) {
                        self.read_struct_field(decl, &mut out);
                    }
                }
                TypeExpr::Struct(out)
            }
            "interface_type" => {
                let mut elems = Vec::new();
                for elem in named(node) {
                    match elem.kind() {
                        "method_elem" | "method_spec" => {
                            let name = elem
                                .child_by_field_name("name")
                                .map(|n| self.text(n).to_string())
                                .unwrap_or_default();
                            elems.push(InterfaceElem::Method {
                                name,
                                sig: self.read_signature(elem),
                            });
                        }
                        "type_elem" | "constraint_elem" | "interface_type_name" => {
                            elems.push(InterfaceElem::Embed(self.first_type(elem)));
                        }
                        _ => elems.push(InterfaceElem::Embed(self.read_type(elem))),
                    }
                }
                TypeExpr::Interface(elems)
            }
            "parenthesized_type" | "parenthesized_expression" | "negated_type" | "type_elem"
            | "type_constraint" | "interface_type_name" => self.first_type(node),
            other => {
                self.error(node, format!("unsupported type syntax {other}"));
                TypeExpr::name("_")
            }
        }
    }

    fn read_struct_field(&mut self, decl: Node<'_>, out: &mut Vec<Field>) {
        let ty = self.type_field(decl, "type");
        let tag = decl
            .child_by_field_name("tag")
            .and_then(|t| lit::unquote_string(self.text(t)).ok());
        let names = fields(decl, "name");
        if names.is_empty() {
            let base = match &ty {
                TypeExpr::Name { name, .. } => name.clone(),
                _ => String::from("_"),
            };
            let ty = if has_token(decl, "*") {
                TypeExpr::pointer(ty)
            } else {
                ty
            };
            out.push(Field {
                name: Some(base),
                ty,
                tag,
                embedded: true,
            });
            return;
        }
        for name in names {
            out.push(Field {
                name: Some(self.text(name).to_string()),
                ty: ty.clone(),
                tag: tag.clone(),
                embedded: false,
            });
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn read_stmt_list(&mut self, node: Node<'_>) -> Block {
        self.read_case_body(node, &[])
    }

    /// Statements among `node`'s children, skipping the named header fields.
    fn read_case_body(&mut self, node: Node<'_>, skip: &[&str]) -> Block {
        let skipped: Vec<usize> = skip
            .iter()
            .flat_map(|f| fields(node, f))
            .map(|n| n.id())
            .collect();
        let mut out = Vec::new();
        for child in named(node) {
            if skipped.contains(&child.id()) {
                continue;
            }
            if child.kind() == "statement_list" {
                out.extend(self.read_stmt_list(child));
            } else {
                self.read_stmt_into(child, &mut out);
            }
        }
        out
    }

    fn read_stmt(&mut self, node: Node<'_>) -> Stmt {
        let mut out = Vec::new();
        self.read_stmt_into(node, &mut out);
        match out.len() {
            1 => out.remove(0),
            _ => Stmt::new(self.pos(node), StmtKind::Block(out)),
        }
    }

    fn read_stmt_into(&mut self, node: Node<'_>, out: &mut Vec<Stmt>) {
        let pos = self.pos(node);
        let kind = match node.kind() {
            "expression_statement" => StmtKind::Expr(self.first_expr(node)),
            "send_statement" => StmtKind::Send {
                chan: self.expr_field(node, "channel"),
                value: self.expr_field(node, "value"),
            },
            "inc_statement" | "dec_statement" => StmtKind::IncDec {
                target: self.first_expr(node),
                inc: node.kind() == "inc_statement",
            },
            "assignment_statement" => {
                let lhs = self.list_field(node, "left");
                let rhs = self.list_field(node, "right");
                let tok = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("=");
                let op = match tok {
                    "=" => None,
                    _ => match BinaryOp::from_token(tok.trim_end_matches('=')) {
                        Some(op) => Some(op),
                        None => {
                            self.error(node, format!("unknown assignment operator {tok}"));
                            None
                        }
                    },
                };
                StmtKind::Assign { lhs, op, rhs }
            }
            "short_var_declaration" => {
                let names = node
                    .child_by_field_name("left")
                    .map(named)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|n| self.text(n).to_string())
                    .collect();
                StmtKind::Define {
                    names,
                    values: self.list_field(node, "right"),
                }
            }
            "var_declaration" | "const_declaration" | "type_declaration" => {
                let mut decls = Vec::new();
                self.read_gen_decl(node, Vec::new(), &mut decls);
                for decl in decls {
                    let pos = decl.pos();
                    out.push(Stmt::new(pos, StmtKind::Decl(decl)));
                }
                return;
            }
            "go_statement" => StmtKind::Go(self.first_expr(node)),
            "defer_statement" => StmtKind::Defer(self.first_expr(node)),
            "return_statement" => {
                let values = match named(node).first() {
                    Some(list) => self.read_expr_list(*list),
                    None => Vec::new(),
                };
                StmtKind::Return(values)
            }
            "if_statement" => {
                let init = node
                    .child_by_field_name("initializer")
                    .map(|i| Box::new(self.read_stmt(i)));
                let cond = self.expr_field(node, "condition");
                let then = node
                    .child_by_field_name("consequence")
                    .map(|b| self.read_stmt_list(b))
                    .unwrap_or_default();
                let els = node.child_by_field_name("alternative").map(|alt| {
                    Box::new(match alt.kind() {
                        "block" => Stmt::new(self.pos(alt), StmtKind::Block(self.read_stmt_list(alt))),
                        _ => self.read_stmt(alt),
                    })
                });
                StmtKind::If {
                    init,
                    cond,
                    then,
                    els,
                }
            }
            "for_statement" => self.read_for(node),
            "expression_switch_statement" => {
                let init = node
                    .child_by_field_name("initializer")
                    .map(|i| Box::new(self.read_stmt(i)));
                let tag = node
                    .child_by_field_name("value")
                    .map(|v| self.read_expr(v));
                let mut cases = Vec::new();
                for case in named(node) {
                    match case.kind() {
                        "expression_case" => cases.push(CaseClause {
                            exprs: self.list_field(case, "value"),
                            default: false,
                            body: self.read_case_body(case, &["value"]),
                            pos: self.pos(case),
                        }),
                        "default_case" => cases.push(CaseClause {
                            exprs: Vec::new(),
                            default: true,
                            body: self.read_case_body(case, &[]),
                            pos: self.pos(case),
                        }),
                        _ => {}
                    }
                }
                StmtKind::Switch { init, tag, cases }
            }
            "type_switch_statement" => {
                let init = node
                    .child_by_field_name("initializer")
                    .map(|i| Box::new(self.read_stmt(i)));
                let bind = node
                    .child_by_field_name("alias")
                    .and_then(|a| named(a).first().copied())
                    .map(|n| self.text(n).to_string());
                let subject = self.expr_field(node, "value");
                let mut cases = Vec::new();
                for case in named(node) {
                    match case.kind() {
                        "type_case" => {
                            let types = fields(case, "type")
                                .into_iter()
                                .map(|t| match self.read_type(t) {
                                    TypeExpr::Name { pkg: None, name, .. } if name == "nil" => None,
                                    ty => Some(ty),
                                })
                                .collect();
                            cases.push(TypeCaseClause {
                                types,
                                default: false,
                                body: self.read_case_body(case, &["type"]),
                                pos: self.pos(case),
                            });
                        }
                        "default_case" => cases.push(TypeCaseClause {
                            types: Vec::new(),
                            default: true,
                            body: self.read_case_body(case, &[]),
                            pos: self.pos(case),
                        }),
                        _ => {}
                    }
                }
                StmtKind::TypeSwitch {
                    init,
                    bind,
                    subject,
                    cases,
                }
            }
            "select_statement" => {
                let mut clauses = Vec::new();
                for case in named(node) {
                    match case.kind() {
                        "communication_case" => {
                            let comm = case
                                .child_by_field_name("communication")
                                .map(|c| self.read_comm(c));
                            clauses.push(CommClause {
                                comm,
                                body: self.read_case_body(case, &["communication"]),
                                pos: self.pos(case),
                            });
                        }
                        "default_case" => clauses.push(CommClause {
                            comm: None,
                            body: self.read_case_body(case, &[]),
                            pos: self.pos(case),
                        }),
                        _ => {}
                    }
                }
                StmtKind::Select(clauses)
            }
            "block" => StmtKind::Block(self.read_stmt_list(node)),
            "labeled_statement" => {
                let label_node = node.child_by_field_name("label");
                let label = label_node.map(|l| self.text(l).to_string()).unwrap_or_default();
                let inner = named(node)
                    .into_iter()
                    .find(|n| Some(n.id()) != label_node.map(|l| l.id()));
                let stmt = match inner {
                    Some(s) => self.read_stmt(s),
                    None => Stmt::new(pos, StmtKind::Empty),
                };
                StmtKind::Labeled {
                    label,
                    stmt: Box::new(stmt),
                }
            }
            "break_statement" => StmtKind::Break(self.label_of(node)),
            "continue_statement" => StmtKind::Continue(self.label_of(node)),
            "goto_statement" => StmtKind::Goto(self.label_of(node).unwrap_or_default()),
            "fallthrough_statement" => StmtKind::Fallthrough,
            "empty_statement" => StmtKind::Empty,
            _ => StmtKind::Expr(self.read_expr(node)),
        };
        out.push(Stmt::new(pos, kind));
    }

    fn label_of(&self, node: Node<'_>) -> Option<String> {
        named(node).first().map(|l| self.text(*l).to_string())
    }

    fn read_for(&mut self, node: Node<'_>) -> StmtKind {
        let body_node = node.child_by_field_name("body");
        let body = body_node.map(|b| self.read_stmt_list(b)).unwrap_or_default();
        let header = named(node)
            .into_iter()
            .find(|n| Some(n.id()) != body_node.map(|b| b.id()));
        let Some(header) = header else {
            return StmtKind::For {
                init: None,
                cond: None,
                post: None,
                body,
            };
        };
        match header.kind() {
            "for_clause" => StmtKind::For {
                init: header
                    .child_by_field_name("initializer")
                    .map(|i| Box::new(self.read_stmt(i))),
                cond: header
                    .child_by_field_name("condition")
                    .map(|c| self.read_expr(c)),
                post: header
                    .child_by_field_name("update")
                    .map(|u| Box::new(self.read_stmt(u))),
                body,
            },
            "range_clause" => {
                let mut lhs = self.list_field_opt(header, "left").into_iter();
                StmtKind::Range {
                    key: lhs.next(),
                    value: lhs.next(),
                    define: has_token(header, ":="),
                    expr: self.expr_field(header, "right"),
                    body,
                }
            }
            _ => StmtKind::For {
                init: None,
                cond: Some(self.read_expr(header)),
                post: None,
                body,
            },
        }
    }

    fn read_comm(&mut self, node: Node<'_>) -> CommOp {
        match node.kind() {
            "send_statement" => CommOp::Send {
                chan: self.expr_field(node, "channel"),
                value: self.expr_field(node, "value"),
            },
            _ => {
                let (lhs, define, right) = if node.kind() == "receive_statement" {
                    (
                        self.list_field_opt(node, "left"),
                        has_token(node, ":="),
                        self.expr_field(node, "right"),
                    )
                } else {
                    (Vec::new(), false, self.read_expr(node))
                };
                let chan = match right.kind {
                    ExprKind::Unary {
                        op: UnaryOp::Recv,
                        x,
                    } => *x,
                    other => {
                        self.error(node, "select case is not a channel operation");
                        Expr::new(right.pos, other)
                    }
                };
                CommOp::Recv { lhs, define, chan }
            }
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expr_field(&mut self, node: Node<'_>, field: &str) -> Expr {
        match node.child_by_field_name(field) {
            Some(e) => self.read_expr(e),
            None => {
                self.error(node, format!("{} is missing its {field}", node.kind()));
                Expr::ident(self.pos(node), "_")
            }
        }
    }

    fn first_expr(&mut self, node: Node<'_>) -> Expr {
        match named(node).first() {
            Some(e) => self.read_expr(*e),
            None => {
                self.error(node, format!("empty {}", node.kind()));
                Expr::ident(self.pos(node), "_")
            }
        }
    }

    fn list_field(&mut self, node: Node<'_>, field: &str) -> Vec<Expr> {
        match node.child_by_field_name(field) {
            Some(list) => self.read_expr_list(list),
            None => {
                self.error(node, format!("{} is missing its {field}", node.kind()));
                Vec::new()
            }
        }
    }

    fn list_field_opt(&mut self, node: Node<'_>, field: &str) -> Vec<Expr> {
        node.child_by_field_name(field)
            .map(|list| self.read_expr_list(list))
            .unwrap_or_default()
    }

    fn read_expr_list(&mut self, node: Node<'_>) -> Vec<Expr> {
        if node.kind() == "expression_list" {
            named(node).into_iter().map(|e| self.read_expr(e)).collect()
        } else {
            vec![self.read_expr(node)]
        }
    }

    fn opt_expr(&mut self, node: Node<'_>, field: &str) -> Option<Box<Expr>> {
        node.child_by_field_name(field)
            .map(|e| Box::new(self.read_expr(e)))
    }

    fn read_expr(&mut self, node: Node<'_>) -> Expr {
        let pos = self.pos(node);
        let kind = match node.kind() {
            "identifier" | "field_identifier" | "package_identifier" | "type_identifier"
            | "label_name" | "nil" | "true" | "false" | "iota" => {
                ExprKind::Ident(self.text(node).to_string())
            }
            "blank_identifier" => ExprKind::Ident("_".into()),
            "int_literal" => ExprKind::BasicLit(Lit::Int(self.text(node).replace('_', ""))),
            "float_literal" => ExprKind::BasicLit(Lit::Float(self.text(node).replace('_', ""))),
            "imaginary_literal" => ExprKind::BasicLit(Lit::Imag(self.text(node).to_string())),
            "rune_literal" => match lit::unquote_rune(self.text(node)) {
                Ok(c) => ExprKind::BasicLit(Lit::Rune(c)),
                Err(msg) => {
                    self.error(node, msg);
                    ExprKind::BasicLit(Lit::Rune('\0'))
                }
            },
            "interpreted_string_literal" | "raw_string_literal" => {
                match lit::unquote_string(self.text(node)) {
                    Ok(s) => ExprKind::BasicLit(Lit::Str(s)),
                    Err(msg) => {
                        self.error(node, msg);
                        ExprKind::BasicLit(Lit::Str(String::new()))
                    }
                }
            }
            "composite_literal" => ExprKind::Composite {
                ty: Some(self.type_field(node, "type")),
                elems: node
                    .child_by_field_name("body")
                    .map(|b| self.read_literal_value(b))
                    .unwrap_or_default(),
            },
            "literal_value" => ExprKind::Composite {
                ty: None,
                elems: self.read_literal_value(node),
            },
            "literal_element" => return self.first_expr(node),
            "func_literal" => ExprKind::FuncLit {
                sig: self.read_signature(node),
                body: node
                    .child_by_field_name("body")
                    .map(|b| self.read_stmt_list(b))
                    .unwrap_or_default(),
            },
            "parenthesized_expression" => ExprKind::Paren(Box::new(self.first_expr(node))),
            "selector_expression" => ExprKind::Selector {
                x: Box::new(self.expr_field(node, "operand")),
                sel: node
                    .child_by_field_name("field")
                    .map(|f| self.text(f).to_string())
                    .unwrap_or_default(),
            },
            "index_expression" => ExprKind::Index {
                x: Box::new(self.expr_field(node, "operand")),
                index: fields(node, "index")
                    .into_iter()
                    .map(|i| self.read_expr(i))
                    .collect(),
            },
            "type_instantiation_expression" => {
                let mut parts = named(node).into_iter();
                let x = match parts.next() {
                    Some(base) => self.read_expr(base),
                    None => Expr::ident(pos, "_"),
                };
                let index = parts
                    .map(|t| {
                        let p = self.pos(t);
                        Expr::new(p, ExprKind::Type(self.read_type(t)))
                    })
                    .collect();
                ExprKind::Index {
                    x: Box::new(x),
                    index,
                }
            }
            "slice_expression" => ExprKind::Slice {
                x: Box::new(self.expr_field(node, "operand")),
                lo: self.opt_expr(node, "start"),
                hi: self.opt_expr(node, "end"),
                max: self.opt_expr(node, "capacity"),
            },
            "type_assertion_expression" => ExprKind::TypeAssert {
                x: Box::new(self.expr_field(node, "operand")),
                ty: Some(self.type_field(node, "type")),
            },
            "type_conversion_expression" => {
                let ty = self.type_field(node, "type");
                ExprKind::Call {
                    func: Box::new(Expr::new(pos, ExprKind::Type(ty))),
                    args: vec![self.expr_field(node, "operand")],
                    ellipsis: false,
                }
            }
            "call_expression" => {
                let mut func = self.expr_field(node, "function");
                if let Some(targs) = node.child_by_field_name("type_arguments") {
                    let index = named(targs)
                        .into_iter()
                        .map(|t| {
                            let p = self.pos(t);
                            Expr::new(p, ExprKind::Type(self.read_type(t)))
                        })
                        .collect();
                    func = Expr::new(
                        func.pos,
                        ExprKind::Index {
                            x: Box::new(func),
                            index,
                        },
                    );
                }
                let mut args = Vec::new();
                let mut ellipsis = false;
                if let Some(list) = node.child_by_field_name("arguments") {
                    ellipsis = has_token(list, "...");
                    for arg in named(list) {
                        if arg.kind() == "variadic_argument" {
                            ellipsis = true;
                            args.push(self.first_expr(arg));
                        } else {
                            args.push(self.read_expr(arg));
                        }
                    }
                }
                ExprKind::Call {
                    func: Box::new(func),
                    args,
                    ellipsis,
                }
            }
            "unary_expression" => {
                let tok = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("");
                let op = match tok {
                    "-" => UnaryOp::Neg,
                    "+" => UnaryOp::Pos,
                    "!" => UnaryOp::Not,
                    "^" => UnaryOp::Xor,
                    "*" => UnaryOp::Deref,
                    "&" => UnaryOp::Addr,
                    "<-" => UnaryOp::Recv,
                    other => {
                        self.error(node, format!("unknown unary operator {other:?}"));
                        UnaryOp::Pos
                    }
                };
                ExprKind::Unary {
                    op,
                    x: Box::new(self.expr_field(node, "operand")),
                }
            }
            "binary_expression" => {
                let tok = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("");
                let op = match BinaryOp::from_token(tok) {
                    Some(op) => op,
                    None => {
                        self.error(node, format!("unknown binary operator {tok:?}"));
                        BinaryOp::Add
                    }
                };
                ExprKind::Binary {
                    op,
                    x: Box::new(self.expr_field(node, "left")),
                    y: Box::new(self.expr_field(node, "right")),
                }
            }
            "slice_type" | "array_type" | "implicit_length_array_type" | "map_type"
            | "channel_type" | "pointer_type" | "function_type" | "struct_type"
            | "interface_type" | "qualified_type" | "generic_type" | "parenthesized_type" => {
                ExprKind::Type(self.read_type(node))
            }
            other => {
                self.error(node, format!("unsupported expression syntax {other}"));
                ExprKind::Ident("_".into())
            }
        };
        Expr::new(pos, kind)
    }

    fn read_literal_value(&mut self, node: Node<'_>) -> Vec<Element> {
        let mut elems = Vec::new();
        for child in named(node) {
            if child.kind() == "keyed_element" {
                let parts = named(child);
                let (Some(k), Some(v)) = (parts.first(), parts.get(1)) else {
                    self.error(child, "malformed keyed element");
                    continue;
                };
                elems.push(Element {
                    key: Some(self.read_expr(*k)),
                    value: self.read_expr(*v),
                });
            } else {
                elems.push(Element {
                    key: None,
                    value: self.read_expr(child),
                });
            }
        }
        elems
    }
}

/// Specs and comments of a (possibly grouped) declaration, in order.
fn collect_specs<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut cursor = node.walk();
    let children: Vec<_> = node.named_children(&mut cursor).collect();
    for child in children {
        match child.kind() {
            "var_spec_list" | "const_spec_list" | "type_spec_list" => collect_specs(child, out),
            _ => out.push(child),
        }
    }
}
