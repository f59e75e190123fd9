//! Source-index oracle: resolves symbols from a project's declarations and
//! those of the other projects in its batch.
//!
//! The index is built once per project from all compilation units. The
//! project's own declarations go in first; sibling projects follow in
//! assembly order and never merge into a type another assembly declared.
//! Type names resolve through the nesting chain, the namespace chain and the
//! file's `using` directives. Predefined keywords map to the platform core
//! library. Anything declared outside the batch is unresolved.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::{
    OracleError, OracleProvider, Resolution, ResolveContext, SemanticOracle, Symbol, SymbolKind,
    SymbolRef, Workspace,
};
use crate::config::AnalysisConfig;
use crate::model::{Accessibility, ProjectSource};
use crate::syntax::{CompilationUnit, Parameter, SyntaxKind, SyntaxNode};

/// Builds a [`SourceIndexOracle`] per project.
#[derive(Debug, Clone)]
pub struct SourceIndexProvider {
    platform_assembly: String,
    strict: bool,
}

impl SourceIndexProvider {
    pub fn new(platform_assembly: impl Into<String>) -> Self {
        Self {
            platform_assembly: platform_assembly.into(),
            strict: false,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            platform_assembly: config.platform_assembly.clone(),
            strict: config.strict_compilation,
        }
    }

    /// Reject projects with syntax errors instead of indexing what parsed.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl OracleProvider for SourceIndexProvider {
    fn open(
        &self,
        project: &ProjectSource,
        units: &[CompilationUnit],
        workspace: &Workspace,
    ) -> Result<Arc<dyn SemanticOracle>, OracleError> {
        if self.strict {
            if let Some(unit) = units.iter().find(|u| u.has_errors) {
                return Err(OracleError::Compilation {
                    project: project.name.clone(),
                    message: format!("syntax errors in {}", unit.path),
                });
            }
        }
        let project_id = project.id();
        let references: Vec<(&str, &[CompilationUnit])> = workspace
            .references(&project_id)
            .map(|p| (p.assembly.as_str(), p.units.as_slice()))
            .collect();
        let oracle = SourceIndexOracle::build_with_references(
            &project.name,
            &self.platform_assembly,
            units,
            &references,
        );
        debug!(
            project = %project.name,
            references = references.len(),
            types = oracle.types.len(),
            members = oracle.members.len(),
            "Source index built"
        );
        Ok(Arc::new(oracle))
    }
}

#[derive(Debug, Clone)]
struct TypeEntry {
    fqn: String,
    name: String,
    kind: SymbolKind,
    assembly: String,
    namespace: String,
    containing: Option<String>,
    modifiers: Vec<String>,
    bases: Vec<String>,
    usings: Vec<String>,
    /// Signature of a delegate.
    parameters: Vec<Parameter>,
    type_parameters: Vec<String>,
    type_text: Option<String>,
    members: Vec<String>,
}

#[derive(Debug, Clone)]
struct MemberEntry {
    fqn: String,
    name: String,
    kind: SymbolKind,
    assembly: String,
    declaring: String,
    modifiers: Vec<String>,
    parameters: Vec<Parameter>,
    type_parameters: Vec<String>,
    type_text: Option<String>,
    locals: Vec<String>,
    has_body: bool,
}

impl MemberEntry {
    fn has(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    fn is_overridable(&self) -> bool {
        self.has("virtual") || self.has("abstract") || self.has("override")
    }
}

/// Name lookup scope: where a type name is written.
struct Scope<'a> {
    namespace: &'a str,
    containing: Option<&'a str>,
    usings: &'a [String],
}

/// Oracle answering from the declarations of one project and its batch.
#[derive(Debug)]
pub struct SourceIndexOracle {
    assembly: String,
    platform_assembly: String,
    types: HashMap<String, TypeEntry>,
    members: HashMap<String, MemberEntry>,
    base_types: HashMap<String, String>,
    direct_interfaces: HashMap<String, Vec<String>>,
    all_interfaces: HashMap<String, Vec<String>>,
    /// Written bases of a type that resolved to nothing.
    unresolved_bases: HashMap<String, Vec<String>>,
}

impl SourceIndexOracle {
    /// Index every declaration of `units`.
    pub fn build(assembly: &str, platform_assembly: &str, units: &[CompilationUnit]) -> Self {
        Self::build_with_references(assembly, platform_assembly, units, &[])
    }

    /// Index `units` as `assembly`, then each referenced project's units as
    /// its own assembly.
    pub fn build_with_references(
        assembly: &str,
        platform_assembly: &str,
        units: &[CompilationUnit],
        references: &[(&str, &[CompilationUnit])],
    ) -> Self {
        let mut oracle = Self {
            assembly: assembly.to_string(),
            platform_assembly: platform_assembly.to_string(),
            types: HashMap::new(),
            members: HashMap::new(),
            base_types: HashMap::new(),
            direct_interfaces: HashMap::new(),
            all_interfaces: HashMap::new(),
            unresolved_bases: HashMap::new(),
        };

        for unit in units {
            oracle.index(&unit.members, unit, assembly, "", None);
        }
        for (reference, reference_units) in references {
            for unit in *reference_units {
                oracle.index(&unit.members, unit, reference, "", None);
            }
        }
        oracle.link_bases();
        oracle.close_interfaces();
        oracle
    }

    fn index(
        &mut self,
        nodes: &[SyntaxNode],
        unit: &CompilationUnit,
        assembly: &str,
        namespace: &str,
        containing: Option<&str>,
    ) {
        for node in nodes {
            match node.kind {
                SyntaxKind::Namespace => {
                    let nested = join(namespace, &node.name);
                    self.index(&node.children, unit, assembly, &nested, None);
                }
                kind if kind.is_type() => {
                    let fqn = qualify(namespace, containing, &node.name);
                    if self.index_type(node, unit, assembly, namespace, containing, &fqn) {
                        self.index(&node.children, unit, assembly, namespace, Some(&fqn));
                    }
                }
                kind if kind.is_member() => {
                    if let Some(declaring) = containing {
                        self.index_member(node, assembly, declaring);
                    }
                }
                _ => {}
            }
        }
    }

    /// Returns false when another assembly already owns `fqn`.
    fn index_type(
        &mut self,
        node: &SyntaxNode,
        unit: &CompilationUnit,
        assembly: &str,
        namespace: &str,
        containing: Option<&str>,
        fqn: &str,
    ) -> bool {
        // Partial declarations merge into the first one seen.
        if let Some(existing) = self.types.get_mut(fqn) {
            if existing.assembly != assembly {
                return false;
            }
            for base in &node.bases {
                if !existing.bases.contains(base) {
                    existing.bases.push(base.clone());
                }
            }
            for modifier in &node.modifiers {
                if !existing.modifiers.contains(modifier) {
                    existing.modifiers.push(modifier.clone());
                }
            }
            for using in &unit.usings {
                if !existing.usings.contains(using) {
                    existing.usings.push(using.clone());
                }
            }
            return true;
        }

        self.types.insert(
            fqn.to_string(),
            TypeEntry {
                fqn: fqn.to_string(),
                name: node.name.clone(),
                kind: type_kind(node.kind),
                assembly: assembly.to_string(),
                namespace: namespace.to_string(),
                containing: containing.map(String::from),
                modifiers: node.modifiers.clone(),
                bases: node.bases.clone(),
                usings: unit.usings.clone(),
                parameters: node.parameters.clone(),
                type_parameters: node.type_parameters.clone(),
                type_text: node.type_text.clone(),
                members: Vec::new(),
            },
        );
        true
    }

    fn index_member(&mut self, node: &SyntaxNode, assembly: &str, declaring: &str) {
        let fqn = member_key(declaring, node);
        let kind = match node.kind {
            SyntaxKind::Method => SymbolKind::Method,
            SyntaxKind::Constructor => SymbolKind::Constructor,
            SyntaxKind::Property => SymbolKind::Property,
            SyntaxKind::EnumMember => SymbolKind::EnumMember,
            _ => SymbolKind::Field,
        };

        if let Some(entry) = self.types.get_mut(declaring) {
            if !entry.members.contains(&fqn) {
                entry.members.push(fqn.clone());
            }
        }
        self.members.entry(fqn.clone()).or_insert_with(|| MemberEntry {
            fqn,
            name: node.name.clone(),
            kind,
            assembly: assembly.to_string(),
            declaring: declaring.to_string(),
            modifiers: node.modifiers.clone(),
            parameters: node.parameters.clone(),
            type_parameters: node.type_parameters.clone(),
            type_text: node.type_text.clone(),
            locals: node.locals.clone(),
            has_body: node.has_body,
        });
    }

    /// Split each type's written bases into base class and direct interfaces.
    fn link_bases(&mut self) {
        let mut fqns: Vec<String> = self.types.keys().cloned().collect();
        fqns.sort();

        for fqn in fqns {
            let Some(entry) = self.types.get(&fqn) else {
                continue;
            };
            let scope = Scope {
                namespace: &entry.namespace,
                containing: entry.containing.as_deref(),
                usings: &entry.usings,
            };

            let mut base = None;
            let mut interfaces = Vec::new();
            let mut unresolved = Vec::new();
            for written in &entry.bases {
                let Some(resolved) = self.resolve_type_name(written, &scope) else {
                    unresolved.push(outer_type_name(written).to_string());
                    continue;
                };
                match resolved.kind {
                    SymbolKind::Interface => {
                        if !interfaces.contains(&resolved.fully_qualified_name) {
                            interfaces.push(resolved.fully_qualified_name);
                        }
                    }
                    SymbolKind::Class if entry.kind == SymbolKind::Class && base.is_none() => {
                        base = Some(resolved.fully_qualified_name);
                    }
                    _ => {}
                }
            }

            if let Some(base) = base.filter(|b| b != &fqn) {
                self.base_types.insert(fqn.clone(), base);
            }
            if !unresolved.is_empty() {
                self.unresolved_bases.insert(fqn.clone(), unresolved);
            }
            self.direct_interfaces.insert(fqn, interfaces);
        }
    }

    /// Compute the transitive interface set of every type.
    fn close_interfaces(&mut self) {
        let mut fqns: Vec<String> = self.types.keys().cloned().collect();
        fqns.sort();

        for fqn in fqns {
            let mut out = Vec::new();
            let mut visited = HashSet::new();
            self.collect_interfaces(&fqn, &mut visited, &mut out);
            out.retain(|i| i != &fqn);
            self.all_interfaces.insert(fqn, out);
        }
    }

    fn collect_interfaces(&self, fqn: &str, visited: &mut HashSet<String>, out: &mut Vec<String>) {
        if !visited.insert(fqn.to_string()) {
            return;
        }
        if let Some(direct) = self.direct_interfaces.get(fqn) {
            for interface in direct {
                if !out.contains(interface) {
                    out.push(interface.clone());
                }
                self.collect_interfaces(interface, visited, out);
            }
        }
        if let Some(base) = self.base_types.get(fqn) {
            self.collect_interfaces(base, visited, out);
        }
    }

    // ------------------------------------------------------------------
    // Type names
    // ------------------------------------------------------------------

    fn resolve_type_name(&self, written: &str, scope: &Scope<'_>) -> Option<SymbolRef> {
        let name = outer_type_name(written);
        if name.is_empty() {
            return None;
        }
        if let Some((fqn, kind)) = predefined_type(name) {
            return Some(SymbolRef::new(fqn, kind, &self.platform_assembly));
        }

        let mut enclosing = scope.containing;
        while let Some(outer) = enclosing {
            let candidate = format!("{outer}.{name}");
            if self.types.contains_key(&candidate) {
                return Some(self.type_ref(&candidate));
            }
            enclosing = self.types.get(outer).and_then(|t| t.containing.as_deref());
        }

        let mut namespace = scope.namespace;
        loop {
            let candidate = join(namespace, name);
            if self.types.contains_key(&candidate) {
                return Some(self.type_ref(&candidate));
            }
            if namespace.is_empty() {
                break;
            }
            namespace = namespace.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
        }

        scope
            .usings
            .iter()
            .map(|using| format!("{using}.{name}"))
            .find(|candidate| self.types.contains_key(candidate))
            .map(|candidate| self.type_ref(&candidate))
    }

    /// Every type mentioned in a type expression, generic arguments
    /// included. Names that resolve to nothing go to `unresolved`, except
    /// type parameters and lowercase tokens (keywords, tuple element names).
    fn type_refs(
        &self,
        written: &str,
        scope: &Scope<'_>,
        type_parameters: &[&str],
        unresolved: &mut Vec<String>,
    ) -> Vec<SymbolRef> {
        static IDENT_CHAIN: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(pattern) = IDENT_CHAIN
            .get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").ok())
        else {
            return Vec::new();
        };

        let mut refs: Vec<SymbolRef> = Vec::new();
        for token in pattern.find_iter(written) {
            let token = token.as_str();
            match self.resolve_type_name(token, scope) {
                Some(resolved) => {
                    if !refs.contains(&resolved) {
                        refs.push(resolved);
                    }
                }
                None => {
                    let skip = type_parameters.contains(&token)
                        || token.starts_with(|c: char| c.is_ascii_lowercase())
                        || unresolved.iter().any(|u| u == token);
                    if !skip {
                        unresolved.push(token.to_string());
                    }
                }
            }
        }
        refs
    }

    fn type_ref(&self, fqn: &str) -> SymbolRef {
        match self.types.get(fqn) {
            Some(entry) => SymbolRef::new(fqn, entry.kind, &entry.assembly),
            None => SymbolRef::new(fqn, SymbolKind::Class, &self.assembly),
        }
    }

    fn member_ref(&self, member: &MemberEntry) -> SymbolRef {
        SymbolRef::new(&member.fqn, member.kind, &member.assembly)
    }

    /// Type parameters visible from inside `fqn`, outer types included.
    fn type_parameters_of<'a>(&'a self, fqn: Option<&'a str>) -> Vec<&'a str> {
        let mut names = Vec::new();
        let mut current = fqn;
        while let Some(outer) = current {
            let Some(entry) = self.types.get(outer) else {
                break;
            };
            names.extend(entry.type_parameters.iter().map(String::as_str));
            current = entry.containing.as_deref();
        }
        names
    }

    fn type_scope<'a>(&'a self, fqn: &'a str) -> Option<Scope<'a>> {
        let entry = self.types.get(fqn)?;
        Some(Scope {
            namespace: &entry.namespace,
            containing: Some(fqn),
            usings: &entry.usings,
        })
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    fn type_symbol(&self, entry: &TypeEntry) -> Symbol {
        let has = |m: &str| entry.modifiers.iter().any(|x| x == m);
        let mut symbol = Symbol::new(entry.kind, &entry.name, &entry.fqn, &entry.assembly);
        symbol.namespace = entry.namespace.clone();
        symbol.accessibility = Accessibility::from_modifiers(&entry.modifiers).unwrap_or(
            if entry.containing.is_some() {
                Accessibility::Private
            } else {
                Accessibility::Internal
            },
        );
        symbol.is_static = has("static");
        symbol.is_abstract = has("abstract") || entry.kind == SymbolKind::Interface;
        symbol.is_sealed = has("sealed")
            || matches!(
                entry.kind,
                SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Delegate
            );
        symbol.containing_type = entry.containing.as_deref().map(|c| self.type_ref(c));
        symbol.base_type = self.base_types.get(&entry.fqn).map(|b| self.type_ref(b));
        symbol.interfaces = self
            .all_interfaces
            .get(&entry.fqn)
            .map(|all| all.iter().map(|i| self.type_ref(i)).collect())
            .unwrap_or_default();

        symbol.unresolved_types = self
            .unresolved_bases
            .get(&entry.fqn)
            .cloned()
            .unwrap_or_default();

        if entry.kind == SymbolKind::Delegate {
            let scope = Scope {
                namespace: &entry.namespace,
                containing: entry.containing.as_deref(),
                usings: &entry.usings,
            };
            let type_parameters = self.type_parameters_of(Some(&entry.fqn));
            let unresolved = &mut symbol.unresolved_types;
            symbol.parameter_types =
                self.parameter_refs(&entry.parameters, &scope, &type_parameters, unresolved);
            symbol.return_types = entry
                .type_text
                .as_deref()
                .map(|t| self.type_refs(t, &scope, &type_parameters, unresolved))
                .unwrap_or_default();
        }
        symbol
    }

    fn member_symbol(&self, member: &MemberEntry) -> Symbol {
        let declaring = self.types.get(&member.declaring);
        let in_interface = declaring.is_some_and(|t| t.kind == SymbolKind::Interface);

        let mut symbol = Symbol::new(member.kind, &member.name, &member.fqn, &member.assembly);
        symbol.namespace = declaring.map(|t| t.namespace.clone()).unwrap_or_default();
        symbol.accessibility = if member.kind == SymbolKind::EnumMember || in_interface {
            Accessibility::from_modifiers(&member.modifiers).unwrap_or(Accessibility::Public)
        } else {
            Accessibility::from_modifiers(&member.modifiers).unwrap_or(Accessibility::Private)
        };
        symbol.is_static = member.has("static") || member.has("const") || member.kind == SymbolKind::EnumMember;
        symbol.is_abstract = member.has("abstract")
            || (in_interface
                && !member.has_body
                && matches!(member.kind, SymbolKind::Method | SymbolKind::Property));
        symbol.is_virtual = member.has("virtual");
        symbol.is_override = member.has("override");
        symbol.is_sealed = member.has("sealed");
        symbol.containing_type = Some(self.type_ref(&member.declaring));

        if let Some(scope) = self.type_scope(&member.declaring) {
            let mut type_parameters = self.type_parameters_of(Some(&member.declaring));
            type_parameters.extend(member.type_parameters.iter().map(String::as_str));
            let unresolved = &mut symbol.unresolved_types;
            symbol.parameter_types =
                self.parameter_refs(&member.parameters, &scope, &type_parameters, unresolved);
            if member.kind != SymbolKind::Constructor {
                symbol.return_types = member
                    .type_text
                    .as_deref()
                    .map(|t| self.type_refs(t, &scope, &type_parameters, unresolved))
                    .unwrap_or_default();
            }
        }

        if symbol.is_override {
            symbol.overridden = self.overridden_member(member).map(|m| self.member_ref(m));
        }
        if !in_interface && matches!(member.kind, SymbolKind::Method | SymbolKind::Property) {
            symbol.implemented_members = self.implemented_members(member);
        }
        symbol
    }

    fn parameter_refs(
        &self,
        parameters: &[Parameter],
        scope: &Scope<'_>,
        type_parameters: &[&str],
        unresolved: &mut Vec<String>,
    ) -> Vec<SymbolRef> {
        let mut refs: Vec<SymbolRef> = Vec::new();
        for parameter in parameters {
            for resolved in self.type_refs(&parameter.type_text, scope, type_parameters, unresolved) {
                if !refs.contains(&resolved) {
                    refs.push(resolved);
                }
            }
        }
        refs
    }

    fn overridden_member(&self, member: &MemberEntry) -> Option<&MemberEntry> {
        let mut visited = HashSet::new();
        let mut current = self.base_types.get(&member.declaring);
        while let Some(base) = current {
            if !visited.insert(base.clone()) {
                break;
            }
            let found = self.own_members(base).find(|m| {
                m.name == member.name
                    && m.kind == member.kind
                    && m.parameters.len() == member.parameters.len()
                    && m.is_overridable()
            });
            if found.is_some() {
                return found;
            }
            current = self.base_types.get(base);
        }
        None
    }

    fn implemented_members(&self, member: &MemberEntry) -> Vec<SymbolRef> {
        let Some(interfaces) = self.all_interfaces.get(&member.declaring) else {
            return Vec::new();
        };
        interfaces
            .iter()
            .filter_map(|interface| {
                self.own_members(interface).find(|m| {
                    m.name == member.name
                        && m.kind == member.kind
                        && m.parameters.len() == member.parameters.len()
                })
            })
            .map(|m| self.member_ref(m))
            .collect()
    }

    // ------------------------------------------------------------------
    // Member lookup
    // ------------------------------------------------------------------

    fn own_members<'a>(&'a self, fqn: &str) -> impl Iterator<Item = &'a MemberEntry> + 'a {
        self.types
            .get(fqn)
            .map(|t| t.members.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|key| self.members.get(key))
    }

    /// Find a member by name in a type, its base chain and its interfaces.
    fn lookup_member(
        &self,
        type_fqn: &str,
        name: &str,
        kinds: &[SymbolKind],
        arity: Option<usize>,
    ) -> Option<&MemberEntry> {
        let mut chain = vec![type_fqn.to_string()];
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = self.base_types.get(type_fqn);
        while let Some(base) = current {
            if !visited.insert(base.clone()) {
                break;
            }
            chain.push(base.clone());
            current = self.base_types.get(base);
        }
        if let Some(interfaces) = self.all_interfaces.get(type_fqn) {
            chain.extend(interfaces.iter().cloned());
        }

        for fqn in &chain {
            let candidates: Vec<&MemberEntry> = self
                .own_members(fqn)
                .filter(|m| m.name == name && kinds.contains(&m.kind))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let exact = match arity {
                Some(n) => candidates.iter().find(|m| m.parameters.len() == n).copied(),
                None => candidates.first().copied(),
            };
            if let Some(found) = exact {
                return Some(found);
            }
            if candidates.len() == 1 {
                return candidates.first().copied();
            }
        }
        None
    }

    /// Look a member up in the enclosing type and then its outer types.
    fn lookup_in_enclosing(
        &self,
        containing: Option<&str>,
        name: &str,
        kinds: &[SymbolKind],
        arity: Option<usize>,
    ) -> Option<&MemberEntry> {
        let mut enclosing = containing;
        while let Some(fqn) = enclosing {
            if let Some(found) = self.lookup_member(fqn, name, kinds, arity) {
                return Some(found);
            }
            enclosing = self.types.get(fqn).and_then(|t| t.containing.as_deref());
        }
        None
    }

    fn is_local(&self, context: &ResolveContext<'_>, name: &str) -> bool {
        context
            .member
            .and_then(|m| self.members.get(m))
            .is_some_and(|m| m.locals.iter().any(|l| l == name) || m.parameters.iter().any(|p| p.name == name))
    }

    /// Declared type of a field or property, resolved where it is declared.
    fn value_type(&self, member: &MemberEntry) -> Option<String> {
        let scope = self.type_scope(&member.declaring)?;
        let written = member.type_text.as_deref()?;
        self.resolve_type_name(written, &scope)
            .map(|r| r.fully_qualified_name)
    }

    /// Type of a receiver expression such as `_repo`, `this.Items` or `Config.Default`.
    fn receiver_type(&self, receiver: &str, context: &ResolveContext<'_>, scope: &Scope<'_>) -> Option<String> {
        if !receiver
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return None;
        }
        if let Some(static_type) = self.resolve_type_name(receiver, scope) {
            return Some(static_type.fully_qualified_name);
        }

        let mut segments = receiver.split('.');
        let first = segments.next()?;
        let mut current = match first {
            "this" => context.containing_type.map(String::from)?,
            "base" => context
                .containing_type
                .and_then(|t| self.base_types.get(t))
                .cloned()?,
            name => {
                if let Some(parameter) = context
                    .member
                    .and_then(|m| self.members.get(m))
                    .and_then(|m| m.parameters.iter().find(|p| p.name == name))
                {
                    self.resolve_type_name(&parameter.type_text, scope)?
                        .fully_qualified_name
                } else if self.is_local(context, name) {
                    return None;
                } else if let Some(member) = self.lookup_in_enclosing(
                    context.containing_type,
                    name,
                    &[SymbolKind::Field, SymbolKind::Property],
                    None,
                ) {
                    self.value_type(member)?
                } else {
                    self.resolve_type_name(name, scope)?.fully_qualified_name
                }
            }
        };

        for segment in segments {
            let member = self.lookup_member(
                &current,
                segment,
                &[SymbolKind::Field, SymbolKind::Property],
                None,
            )?;
            current = self.value_type(member)?;
        }
        Some(current)
    }

    fn resolve_invocation(&self, node: &SyntaxNode, context: &ResolveContext<'_>, scope: &Scope<'_>) -> Option<Symbol> {
        let kinds = [SymbolKind::Method];
        let arity = Some(node.argument_count);
        let target = match node.receiver.as_deref() {
            None => self.lookup_in_enclosing(context.containing_type, &node.name, &kinds, arity),
            Some(receiver) => {
                let receiver_type = self.receiver_type(receiver, context, scope)?;
                self.lookup_member(&receiver_type, &node.name, &kinds, arity)
            }
        }?;
        Some(self.member_symbol(target))
    }

    fn resolve_creation(&self, node: &SyntaxNode, scope: &Scope<'_>) -> Option<Symbol> {
        let created = self.resolve_type_name(&node.name, scope)?;
        let Some(entry) = self.types.get(&created.fully_qualified_name) else {
            let mut platform = Symbol::new(
                created.kind,
                outer_type_name(&node.name),
                &created.fully_qualified_name,
                &created.assembly,
            );
            platform.accessibility = Accessibility::Public;
            return Some(platform);
        };

        let constructor = self
            .own_members(&entry.fqn)
            .find(|m| m.kind == SymbolKind::Constructor && m.parameters.len() == node.argument_count);
        Some(match constructor {
            Some(constructor) => self.member_symbol(constructor),
            None => self.type_symbol(entry),
        })
    }

    fn resolve_access(&self, node: &SyntaxNode, context: &ResolveContext<'_>, scope: &Scope<'_>) -> Option<Symbol> {
        let kinds = [SymbolKind::Field, SymbolKind::Property, SymbolKind::EnumMember];
        let member = match node.receiver.as_deref() {
            None => {
                if self.is_local(context, &node.name) {
                    return Some(Symbol::new(SymbolKind::Local, &node.name, &node.name, &self.assembly));
                }
                self.lookup_in_enclosing(context.containing_type, &node.name, &kinds, None)
            }
            Some(receiver) => {
                let receiver_type = self.receiver_type(receiver, context, scope)?;
                self.lookup_member(&receiver_type, &node.name, &kinds, None)
            }
        }?;
        Some(self.member_symbol(member))
    }
}

impl SemanticOracle for SourceIndexOracle {
    fn resolve_declaration(
        &self,
        node: &SyntaxNode,
        context: &ResolveContext<'_>,
    ) -> Result<Resolution, OracleError> {
        let symbol = if node.kind.is_type() {
            let fqn = qualify(context.namespace, context.containing_type, &node.name);
            self.types.get(&fqn).map(|t| self.type_symbol(t))
        } else if node.kind.is_member() {
            context
                .containing_type
                .and_then(|declaring| self.members.get(&member_key(declaring, node)))
                .map(|m| self.member_symbol(m))
        } else {
            None
        };

        Ok(match symbol {
            Some(symbol) => Resolution::resolved(symbol),
            None => Resolution::Unresolved(format!("{:?} `{}`", node.kind, node.name)),
        })
    }

    fn resolve_reference(
        &self,
        node: &SyntaxNode,
        context: &ResolveContext<'_>,
    ) -> Result<Resolution, OracleError> {
        let scope = Scope {
            namespace: context.namespace,
            containing: context.containing_type,
            usings: &context.unit.usings,
        };
        let symbol = match node.kind {
            SyntaxKind::Invocation => self.resolve_invocation(node, context, &scope),
            SyntaxKind::ObjectCreation => self.resolve_creation(node, &scope),
            SyntaxKind::MemberAccess => self.resolve_access(node, context, &scope),
            _ => None,
        };

        Ok(match symbol {
            Some(symbol) => Resolution::resolved(symbol),
            None => Resolution::Unresolved(match &node.receiver {
                Some(receiver) => format!("{:?} `{}.{}`", node.kind, receiver, node.name),
                None => format!("{:?} `{}`", node.kind, node.name),
            }),
        })
    }
}

fn type_kind(kind: SyntaxKind) -> SymbolKind {
    match kind {
        SyntaxKind::Interface => SymbolKind::Interface,
        SyntaxKind::Struct => SymbolKind::Struct,
        SyntaxKind::Enum => SymbolKind::Enum,
        SyntaxKind::Delegate => SymbolKind::Delegate,
        _ => SymbolKind::Class,
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Fully qualified name of a type declared in `namespace` or inside `containing`.
fn qualify(namespace: &str, containing: Option<&str>, name: &str) -> String {
    match containing {
        Some(outer) => format!("{outer}.{name}"),
        None => join(namespace, name),
    }
}

/// Fully qualified name of a member. Methods include parameter types so
/// overloads stay distinct; constructors are named `.ctor`.
fn member_key(declaring: &str, node: &SyntaxNode) -> String {
    let parameters = || {
        node.parameters
            .iter()
            .map(|p| p.type_text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    match node.kind {
        SyntaxKind::Method => format!("{declaring}.{}({})", node.name, parameters()),
        SyntaxKind::Constructor => format!("{declaring}..ctor({})", parameters()),
        _ => format!("{declaring}.{}", node.name),
    }
}

/// `Dictionary` for `global::Dictionary<string, int>[]?`.
fn outer_type_name(written: &str) -> &str {
    let name = written.trim();
    let name = name.strip_prefix("global::").unwrap_or(name);
    let name = name.split('<').next().unwrap_or(name);
    name.trim_end_matches(['?', '[', ']', ',']).trim()
}

fn predefined_type(keyword: &str) -> Option<(&'static str, SymbolKind)> {
    let mapped = match keyword {
        "bool" => ("System.Boolean", SymbolKind::Struct),
        "byte" => ("System.Byte", SymbolKind::Struct),
        "sbyte" => ("System.SByte", SymbolKind::Struct),
        "char" => ("System.Char", SymbolKind::Struct),
        "decimal" => ("System.Decimal", SymbolKind::Struct),
        "double" => ("System.Double", SymbolKind::Struct),
        "float" => ("System.Single", SymbolKind::Struct),
        "int" => ("System.Int32", SymbolKind::Struct),
        "uint" => ("System.UInt32", SymbolKind::Struct),
        "long" => ("System.Int64", SymbolKind::Struct),
        "ulong" => ("System.UInt64", SymbolKind::Struct),
        "short" => ("System.Int16", SymbolKind::Struct),
        "ushort" => ("System.UInt16", SymbolKind::Struct),
        "nint" => ("System.IntPtr", SymbolKind::Struct),
        "nuint" => ("System.UIntPtr", SymbolKind::Struct),
        "void" => ("System.Void", SymbolKind::Struct),
        "object" | "dynamic" => ("System.Object", SymbolKind::Class),
        "string" => ("System.String", SymbolKind::Class),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{CSharpParser, SourceParser, Span};

    fn oracle(sources: &[(&str, &str)]) -> (SourceIndexOracle, Vec<CompilationUnit>) {
        let parser = CSharpParser::new().unwrap();
        let units: Vec<CompilationUnit> = sources
            .iter()
            .map(|(path, source)| parser.parse_unit(path, source).unwrap())
            .collect();
        (SourceIndexOracle::build("Shop", "System.Private.CoreLib", &units), units)
    }

    fn ctx<'a>(unit: &'a CompilationUnit, ns: &'a str, ty: Option<&'a str>, member: Option<&'a str>) -> ResolveContext<'a> {
        ResolveContext {
            unit,
            namespace: ns,
            containing_type: ty,
            member,
        }
    }

    #[test]
    fn test_transitive_interfaces_through_base() {
        let (oracle, units) = oracle(&[
            ("A.cs", "namespace P { class A : B { } }"),
            ("B.cs", "namespace P { interface IB { void M(); } class B : IB { public void M() { } } }"),
        ]);
        let node = SyntaxNode::new(SyntaxKind::Class, "A", Span::default());
        let resolution = oracle
            .resolve_declaration(&node, &ctx(&units[0], "P", None, None))
            .unwrap();
        let symbol = resolution.symbol().unwrap();
        assert_eq!(symbol.fully_qualified_name, "P.A");
        assert_eq!(symbol.base_type.as_ref().unwrap().fully_qualified_name, "P.B");
        assert_eq!(symbol.interfaces.len(), 1);
        assert_eq!(symbol.interfaces[0].fully_qualified_name, "P.IB");
        assert_eq!(symbol.interfaces[0].kind, SymbolKind::Interface);
    }

    #[test]
    fn test_member_symbols_and_implementations() {
        let (oracle, units) = oracle(&[(
            "Repo.cs",
            r#"
namespace Shop
{
    public interface IRepo { void Save(Order order); }
    public class Order { }
    public abstract class BaseRepo : IRepo
    {
        public abstract void Save(Order order);
    }
    public class SqlRepo : BaseRepo
    {
        public override void Save(Order order) { }
    }
}
"#,
        )]);

        let save = SyntaxNode::new(SyntaxKind::Method, "Save", Span::default())
            .with_parameter("order", "Order")
            .with_modifiers(["public", "override"]);
        let resolution = oracle
            .resolve_declaration(&save, &ctx(&units[0], "Shop", Some("Shop.SqlRepo"), None))
            .unwrap();
        let symbol = resolution.symbol().unwrap();

        assert_eq!(symbol.fully_qualified_name, "Shop.SqlRepo.Save(Order)");
        assert!(symbol.is_override);
        assert_eq!(
            symbol.overridden.as_ref().unwrap().fully_qualified_name,
            "Shop.BaseRepo.Save(Order)"
        );
        assert_eq!(symbol.implemented_members.len(), 1);
        assert_eq!(
            symbol.implemented_members[0].fully_qualified_name,
            "Shop.IRepo.Save(Order)"
        );
        assert_eq!(symbol.parameter_types[0].fully_qualified_name, "Shop.Order");
        assert_eq!(symbol.return_types[0].fully_qualified_name, "System.Void");
        assert_eq!(symbol.return_types[0].assembly, "System.Private.CoreLib");
    }

    #[test]
    fn test_invocation_through_field_receiver() {
        let (oracle, units) = oracle(&[(
            "Checkout.cs",
            r#"
namespace Shop
{
    public interface IRepo { void Save(int id); }
    public class Checkout
    {
        private IRepo _repo;
        public void Run(int id) { _repo.Save(id); Helper(); }
        private void Helper() { }
    }
}
"#,
        )]);
        let context = ctx(&units[0], "Shop", Some("Shop.Checkout"), Some("Shop.Checkout.Run(int)"));

        let call = SyntaxNode::new(SyntaxKind::Invocation, "Save", Span::default())
            .with_receiver("_repo")
            .with_arguments(1);
        let resolution = oracle.resolve_reference(&call, &context).unwrap();
        let symbol = resolution.symbol().unwrap();
        assert_eq!(symbol.fully_qualified_name, "Shop.IRepo.Save(int)");
        assert!(symbol.is_abstract);
        assert_eq!(symbol.containing_type.as_ref().unwrap().kind, SymbolKind::Interface);

        let helper = SyntaxNode::new(SyntaxKind::Invocation, "Helper", Span::default());
        let resolution = oracle.resolve_reference(&helper, &context).unwrap();
        assert_eq!(resolution.symbol().unwrap().fully_qualified_name, "Shop.Checkout.Helper()");

        let external = SyntaxNode::new(SyntaxKind::Invocation, "WriteLine", Span::default())
            .with_receiver("Console")
            .with_arguments(1);
        assert!(!oracle.resolve_reference(&external, &context).unwrap().is_resolved());
    }

    #[test]
    fn test_locals_and_object_creation() {
        let (oracle, units) = oracle(&[(
            "Cart.cs",
            r#"
namespace Shop
{
    public class Item { public Item(string name) { } }
    public class Tag { }
    public class Cart
    {
        public void Add(string name) { var item = new Item(name); var tag = new Tag(); }
    }
}
"#,
        )]);
        let context = ctx(&units[0], "Shop", Some("Shop.Cart"), Some("Shop.Cart.Add(string)"));

        let local = SyntaxNode::new(SyntaxKind::MemberAccess, "name", Span::default());
        let resolution = oracle.resolve_reference(&local, &context).unwrap();
        assert_eq!(resolution.symbol().unwrap().kind, SymbolKind::Local);

        let with_ctor = SyntaxNode::new(SyntaxKind::ObjectCreation, "Item", Span::default()).with_arguments(1);
        let resolution = oracle.resolve_reference(&with_ctor, &context).unwrap();
        let symbol = resolution.symbol().unwrap();
        assert_eq!(symbol.kind, SymbolKind::Constructor);
        assert_eq!(symbol.fully_qualified_name, "Shop.Item..ctor(string)");

        let without_ctor = SyntaxNode::new(SyntaxKind::ObjectCreation, "Tag", Span::default());
        let resolution = oracle.resolve_reference(&without_ctor, &context).unwrap();
        assert_eq!(resolution.symbol().unwrap().kind, SymbolKind::Class);
    }

    #[test]
    fn test_strict_provider_rejects_syntax_errors() {
        let parser = CSharpParser::new().unwrap();
        let units = vec![parser.parse_unit("Bad.cs", "class Bad { void M( { }").unwrap()];
        let project = ProjectSource::new("Bad", "Bad.csproj");

        let strict = SourceIndexProvider::new("System.Private.CoreLib").strict(true);
        assert!(matches!(
            strict.open(&project, &units, &Workspace::new()),
            Err(OracleError::Compilation { .. })
        ));

        let lenient = SourceIndexProvider::new("System.Private.CoreLib");
        assert!(lenient.open(&project, &units, &Workspace::new()).is_ok());
    }

    #[test]
    fn test_sibling_project_types_resolve_to_their_assembly() {
        let parser = CSharpParser::new().unwrap();
        let lib = vec![parser
            .parse_unit(
                "Lib/Order.cs",
                "namespace Lib.Models { public class Order { public void Ship() { } } public class Program { } }",
            )
            .unwrap()];
        let app = vec![parser
            .parse_unit(
                "App/Service.cs",
                r#"
using Lib.Models;
namespace App
{
    class Program { }
    class Service : Order, IAudited
    {
        void Place(Order o, Missing m) { o.Ship(); }
    }
}
"#,
            )
            .unwrap()];
        let oracle = SourceIndexOracle::build_with_references(
            "App",
            "System.Private.CoreLib",
            &app,
            &[("Lib", lib.as_slice())],
        );
        let context = ctx(&app[0], "App", None, None);

        let service = SyntaxNode::new(SyntaxKind::Class, "Service", Span::default());
        let resolution = oracle.resolve_declaration(&service, &context).unwrap();
        let symbol = resolution.symbol().unwrap();
        assert_eq!(symbol.assembly, "App");
        let base = symbol.base_type.as_ref().unwrap();
        assert_eq!(base.fully_qualified_name, "Lib.Models.Order");
        assert_eq!(base.assembly, "Lib");
        assert_eq!(symbol.unresolved_types, vec!["IAudited"]);

        let place = SyntaxNode::new(SyntaxKind::Method, "Place", Span::default())
            .with_parameter("o", "Order")
            .with_parameter("m", "Missing");
        let member_context = ctx(&app[0], "App", Some("App.Service"), None);
        let resolution = oracle.resolve_declaration(&place, &member_context).unwrap();
        let symbol = resolution.symbol().unwrap();
        assert_eq!(symbol.parameter_types.len(), 1);
        assert_eq!(symbol.parameter_types[0].assembly, "Lib");
        assert_eq!(symbol.unresolved_types, vec!["Missing"]);

        let ship = SyntaxNode::new(SyntaxKind::Invocation, "Ship", Span::default()).with_receiver("o");
        let call_context = ctx(&app[0], "App", Some("App.Service"), Some("App.Service.Place(Order, Missing)"));
        let resolution = oracle.resolve_reference(&ship, &call_context).unwrap();
        assert_eq!(resolution.symbol().unwrap().fully_qualified_name, "Lib.Models.Order.Ship()");

        // The project's own declaration wins over a sibling's of the same name.
        let program = SyntaxNode::new(SyntaxKind::Class, "Program", Span::default());
        let resolution = oracle.resolve_declaration(&program, &context).unwrap();
        assert_eq!(resolution.symbol().unwrap().assembly, "App");
    }

    #[test]
    fn test_type_parameters_are_not_unresolved() {
        let (oracle, units) = oracle(&[(
            "Cache.cs",
            "namespace Shop { class Cache<TKey> { TValue Get<TValue>(TKey key, (int count, string name) meta) { return default; } } }",
        )]);
        let get = &units[0].members[0].children[0].children[0];
        assert_eq!(get.name, "Get");
        let resolution = oracle
            .resolve_declaration(get, &ctx(&units[0], "Shop", Some("Shop.Cache"), None))
            .unwrap();
        assert!(resolution.symbol().unwrap().unresolved_types.is_empty());
    }

    #[test]
    fn test_outer_type_name() {
        assert_eq!(outer_type_name("global::System.Collections.Generic.List<int>"), "System.Collections.Generic.List");
        assert_eq!(outer_type_name("Order[]"), "Order");
        assert_eq!(outer_type_name("Order?"), "Order");
    }
}
