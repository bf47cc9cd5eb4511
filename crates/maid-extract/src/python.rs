//! Python extractor (tree-sitter)
//!
//! Collects module-level functions, classes and attributes, plus class
//! members: methods, class-level assignments and attributes assigned through
//! the method receiver (`self.x = ...`). Receivers are dropped from method
//! arguments unless the method is a `@staticmethod`. Raised error kinds come
//! from `raise` statements in the function body, not from nested scopes.

use crate::error::ExtractError;
use crate::ArtifactExtractor;
use maid_manifest::{normalize_type, Arg, Artifact};
use std::collections::BTreeSet;
use tree_sitter::{Node, Parser};

const STATICMETHOD: &str = "staticmethod";

/// Node kinds opening a scope whose statements belong elsewhere
const NESTED_SCOPES: [&str; 3] = ["function_definition", "class_definition", "lambda"];

/// Destructuring targets that may hold several names
const PATTERNS: [&str; 3] = ["pattern_list", "tuple_pattern", "list_pattern"];

/// Extractor for `.py` and `.pyi` files
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonExtractor;

impl PythonExtractor {
    /// Create extractor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactExtractor for PythonExtractor {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extract(&self, source: &str) -> Result<Vec<Artifact>, ExtractError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ExtractError::ParserInit(e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or(ExtractError::ParseFailed)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(syntax_error(root, source.as_bytes()));
        }

        let mut walker = Walker {
            src: source.as_bytes(),
            artifacts: Vec::new(),
        };
        walker.module(root)?;
        Ok(walker.artifacts)
    }

    fn extensions(&self) -> &[&str] {
        &["py", "pyi"]
    }
}

struct Walker<'s> {
    src: &'s [u8],
    artifacts: Vec<Artifact>,
}

impl<'s> Walker<'s> {
    fn text(&self, node: Node<'_>) -> Result<&'s str, ExtractError> {
        Ok(node.utf8_text(self.src)?)
    }

    fn module(&mut self, root: Node<'_>) -> Result<(), ExtractError> {
        let mut attributes = BTreeSet::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "function_definition" => {
                    self.function(child, None, false)?;
                }
                "class_definition" => self.class(child)?,
                "decorated_definition" => {
                    self.decorated(child, None)?;
                }
                "expression_statement" => {
                    for name in self.assigned_names(child)? {
                        if attributes.insert(name) {
                            self.artifacts.push(Artifact::attribute(name));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn class(&mut self, node: Node<'_>) -> Result<(), ExtractError> {
        let name = self.text(field(node, "name")?)?;
        let bases = match node.child_by_field_name("superclasses") {
            Some(list) => self.bases(list)?,
            None => Vec::new(),
        };
        self.artifacts.push(Artifact::class(name).with_bases(bases));

        let body = field(node, "body")?;
        let mut attributes = Vec::new();
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            match child.kind() {
                "function_definition" => attributes.extend(self.function(child, Some(name), false)?),
                "decorated_definition" => attributes.extend(self.decorated(child, Some(name))?),
                "expression_statement" => attributes.extend(self.assigned_names(child)?),
                _ => {}
            }
        }

        let mut seen = BTreeSet::new();
        for attribute in attributes {
            if seen.insert(attribute) {
                self.artifacts
                    .push(Artifact::attribute(attribute).in_class(name));
            }
        }
        Ok(())
    }

    /// Returns the receiver attributes of a decorated method
    fn decorated(
        &mut self,
        node: Node<'_>,
        class: Option<&str>,
    ) -> Result<Vec<&'s str>, ExtractError> {
        let definition = field(node, "definition")?;
        let mut is_static = false;
        let mut cursor = node.walk();
        for decorator in node.named_children(&mut cursor) {
            if decorator.kind() == "decorator" {
                let text = self.text(decorator)?.trim_start_matches('@').trim();
                is_static |= text == STATICMETHOD;
            }
        }

        match (definition.kind(), class) {
            ("function_definition", _) => self.function(definition, class, is_static),
            ("class_definition", None) => self.class(definition).map(|()| Vec::new()),
            _ => Ok(Vec::new()),
        }
    }

    /// Returns the attributes assigned through the receiver (methods only)
    fn function(
        &mut self,
        node: Node<'_>,
        class: Option<&str>,
        is_static: bool,
    ) -> Result<Vec<&'s str>, ExtractError> {
        let name = self.text(field(node, "name")?)?;
        let mut args = match node.child_by_field_name("parameters") {
            Some(params) => self.parameters(params)?,
            None => Vec::new(),
        };

        let has_receiver = class.is_some()
            && !is_static
            && args.first().is_some_and(|a| !a.name.starts_with('*'));
        let receiver = has_receiver.then(|| args.remove(0).name);

        let body = field(node, "body")?;
        let raises = self.raises(body)?;
        let attributes = match &receiver {
            Some(receiver) => self.receiver_attributes(body, receiver)?,
            None => Vec::new(),
        };

        let mut artifact = Artifact::function(name).with_args(args).raising(raises);
        if let Some(returns) = node.child_by_field_name("return_type") {
            artifact = artifact.returning(normalize_type(self.text(returns)?));
        }
        if let Some(class) = class {
            artifact = artifact.in_class(class);
        }
        self.artifacts.push(artifact);
        Ok(attributes)
    }

    fn parameters(&self, node: Node<'_>) -> Result<Vec<Arg>, ExtractError> {
        let mut args = Vec::new();
        let mut cursor = node.walk();
        for param in node.named_children(&mut cursor) {
            let arg = match param.kind() {
                "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    Arg::new(self.text(param)?)
                }
                "default_parameter" => Arg::new(self.text(field(param, "name")?)?),
                "typed_default_parameter" => Arg::typed(
                    self.text(field(param, "name")?)?,
                    normalize_type(self.text(field(param, "type")?)?),
                ),
                "typed_parameter" => {
                    let target = param
                        .named_child(0)
                        .ok_or_else(|| unexpected(param, "typed parameter without name"))?;
                    Arg::typed(
                        self.text(target)?,
                        normalize_type(self.text(field(param, "type")?)?),
                    )
                }
                _ => continue,
            };
            args.push(arg);
        }
        Ok(args)
    }

    fn bases(&self, list: Node<'_>) -> Result<Vec<String>, ExtractError> {
        let mut bases = Vec::new();
        let mut cursor = list.walk();
        for base in list.named_children(&mut cursor) {
            match base.kind() {
                "keyword_argument" | "list_splat" | "dictionary_splat" | "comment" => {}
                _ => bases.push(normalize_type(self.text(base)?)),
            }
        }
        Ok(bases)
    }

    /// Names bound by the assignments of one statement
    fn assigned_names(&self, statement: Node<'_>) -> Result<Vec<&'s str>, ExtractError> {
        let mut names = Vec::new();
        let mut cursor = statement.walk();
        for expr in statement.named_children(&mut cursor) {
            let mut current = Some(expr);
            // `a = b = 1` nests the second assignment on the right.
            while let Some(assignment) = current.filter(|n| n.kind() == "assignment") {
                if let Some(left) = assignment.child_by_field_name("left") {
                    self.target_names(left, &mut names)?;
                }
                current = assignment.child_by_field_name("right");
            }
        }
        Ok(names)
    }

    fn target_names(&self, target: Node<'_>, out: &mut Vec<&'s str>) -> Result<(), ExtractError> {
        match target.kind() {
            "identifier" => out.push(self.text(target)?),
            kind if PATTERNS.contains(&kind) => {
                let mut cursor = target.walk();
                for child in target.named_children(&mut cursor) {
                    self.target_names(child, out)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn receiver_attributes(
        &self,
        body: Node<'_>,
        receiver: &str,
    ) -> Result<Vec<&'s str>, ExtractError> {
        let mut names = Vec::new();
        walk_scope(body, &mut |node| {
            if node.kind() == "assignment" {
                if let Some(left) = node.child_by_field_name("left") {
                    self.receiver_targets(left, receiver, &mut names)?;
                }
            }
            Ok(())
        })?;
        Ok(names)
    }

    fn receiver_targets(
        &self,
        target: Node<'_>,
        receiver: &str,
        out: &mut Vec<&'s str>,
    ) -> Result<(), ExtractError> {
        match target.kind() {
            "attribute" => {
                let object = field(target, "object")?;
                if object.kind() == "identifier" && self.text(object)? == receiver {
                    out.push(self.text(field(target, "attribute")?)?);
                }
            }
            kind if PATTERNS.contains(&kind) => {
                let mut cursor = target.walk();
                for child in target.named_children(&mut cursor) {
                    self.receiver_targets(child, receiver, out)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn raises(&self, body: Node<'_>) -> Result<Vec<String>, ExtractError> {
        let mut raises = Vec::new();
        walk_scope(body, &mut |node| {
            if node.kind() == "raise_statement" {
                if let Some(raised) = node.named_child(0) {
                    let kind = match raised.kind() {
                        "call" => field(raised, "function")?,
                        _ => raised,
                    };
                    raises.push(self.text(kind)?.to_string());
                }
            }
            Ok(())
        })?;
        Ok(raises)
    }
}

/// Visit every named descendant of `node` outside nested scopes
fn walk_scope<'t, F>(node: Node<'t>, visit: &mut F) -> Result<(), ExtractError>
where
    F: FnMut(Node<'t>) -> Result<(), ExtractError>,
{
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if NESTED_SCOPES.contains(&child.kind()) {
            continue;
        }
        visit(child)?;
        walk_scope(child, visit)?;
    }
    Ok(())
}

fn field<'t>(node: Node<'t>, name: &str) -> Result<Node<'t>, ExtractError> {
    node.child_by_field_name(name)
        .ok_or_else(|| unexpected(node, &format!("{} without {name}", node.kind())))
}

fn unexpected(node: Node<'_>, message: &str) -> ExtractError {
    let pos = node.start_position();
    ExtractError::Syntax {
        line: pos.row + 1,
        column: pos.column + 1,
        message: message.to_string(),
    }
}

/// Locate the first error or missing node in document order
fn syntax_error(root: Node<'_>, src: &[u8]) -> ExtractError {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_missing() {
            return unexpected(node, &format!("missing {}", node.kind()));
        }
        if node.is_error() {
            let text = node.utf8_text(src).unwrap_or_default();
            let snippet: String = text
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(40)
                .collect();
            return unexpected(node, &format!("unexpected `{snippet}`"));
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node
            .children(&mut cursor)
            .filter(|c| c.has_error() || c.is_missing())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    unexpected(root, "invalid syntax")
}
