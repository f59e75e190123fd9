//! End-to-end analysis of inline C# projects through the tree-sitter front end.

use std::collections::BTreeSet;

use kgraph_core::ids::node_id;
use kgraph_core::{Config, EdgeKind, NodeKind, ProjectAnalyzer, ProjectGraph, ProjectSource};

const INTERFACES: &str = r#"
namespace P
{
    public interface IB { void M(); }
}
"#;

const BASE: &str = r#"
namespace P
{
    public class B : IB
    {
        public void M() { }
    }
}
"#;

const DERIVED: &str = r#"
namespace P
{
    public class A : B { }
}
"#;

fn analyze(project: &ProjectSource) -> ProjectGraph {
    ProjectAnalyzer::from_config(&Config::default().analysis).unwrap()
        .analyze(project, "fp")
        .unwrap()
        .graph
}

fn edge_count(graph: &ProjectGraph, source: &str, target: &str, kind: EdgeKind) -> Option<u32> {
    graph
        .edges
        .iter()
        .find(|e| e.source == source && e.target == target && e.kind == kind)
        .map(|e| e.count)
}

fn project(files: &[(&str, &str)]) -> ProjectSource {
    files
        .iter()
        .fold(ProjectSource::new("P", "P/P.csproj"), |p, (path, content)| {
            p.with_file(*path, *content)
        })
}

#[test]
fn test_inheritance_scenario() {
    let graph = analyze(&project(&[
        ("P/IB.cs", INTERFACES),
        ("P/B.cs", BASE),
        ("P/A.cs", DERIVED),
    ]));

    let a = graph.node_by_name("P.A").unwrap();
    let b = graph.node_by_name("P.B").unwrap();
    let ib = graph.node_by_name("P.IB").unwrap();
    assert_eq!(a.kind, NodeKind::Class);
    assert_eq!(b.kind, NodeKind::Class);
    assert_eq!(ib.kind, NodeKind::Interface);

    assert_eq!(edge_count(&graph, &a.id, &b.id, EdgeKind::Inherits), Some(1));
    assert_eq!(edge_count(&graph, &b.id, &ib.id, EdgeKind::Implements), Some(1));
    assert_eq!(edge_count(&graph, &a.id, &ib.id, EdgeKind::Implements), Some(1));
    // The root object type never appears as a base.
    assert!(graph.node_by_name("System.Object").is_none());
    assert!(!graph
        .edges
        .iter()
        .any(|e| e.kind == EdgeKind::Inherits && e.source == b.id));
}

#[test]
fn test_ids_ignore_file_order() {
    let forward = analyze(&project(&[
        ("P/IB.cs", INTERFACES),
        ("P/B.cs", BASE),
        ("P/A.cs", DERIVED),
    ]));
    let reversed = analyze(&project(&[
        ("P/A.cs", DERIVED),
        ("P/B.cs", BASE),
        ("P/IB.cs", INTERFACES),
    ]));

    let ids = |g: &ProjectGraph| g.nodes.iter().map(|n| n.id.clone()).collect::<BTreeSet<_>>();
    let keys = |g: &ProjectGraph| {
        g.edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone(), e.kind, e.count))
            .collect::<BTreeSet<_>>()
    };
    assert_eq!(ids(&forward), ids(&reversed));
    assert_eq!(keys(&forward), keys(&reversed));
    assert_eq!(
        forward.node_by_name("P.A").unwrap().id,
        node_id(NodeKind::Class, "P.A")
    );
}

#[test]
fn test_repeated_references_fold_into_counts() {
    let graph = analyze(&project(&[
        (
            "P/Helper.cs",
            r#"
namespace P
{
    public class Helper
    {
        public static void Run() { }
    }
    public partial class Worker : Helper { }
}
"#,
        ),
        (
            "P/Worker.cs",
            r#"
namespace P
{
    public partial class Worker : Helper
    {
        public void Go()
        {
            Helper.Run();
            Helper.Run();
            Helper.Run();
        }
    }
}
"#,
        ),
    ]));

    let go = node_id(NodeKind::Method, "P.Worker.Go()");
    let run = node_id(NodeKind::Method, "P.Helper.Run()");
    let worker = node_id(NodeKind::Class, "P.Worker");
    let helper = node_id(NodeKind::Class, "P.Helper");

    assert_eq!(edge_count(&graph, &go, &run, EdgeKind::Calls), Some(3));
    // Both partial declarations name the same base.
    assert_eq!(edge_count(&graph, &worker, &helper, EdgeKind::Inherits), Some(2));
    assert_eq!(
        graph
            .edges
            .iter()
            .filter(|e| e.source == go && e.target == run)
            .count(),
        1
    );
    assert_eq!(graph.nodes.iter().filter(|n| n.id == worker).count(), 1);
}

#[test]
fn test_polymorphic_calls_reach_implementations() {
    let graph = analyze(&project(&[(
        "P/Shapes.cs",
        r#"
namespace P
{
    public interface IShape { double Area(); }
    public class Square : IShape { public double Area() { return 1; } }
    public class Circle : IShape { public double Area() { return 3; } }
    public class Canvas
    {
        private IShape _shape;
        public double Measure() { return _shape.Area(); }
    }
}
"#,
    )]));

    let measure = node_id(NodeKind::Method, "P.Canvas.Measure()");
    let area = node_id(NodeKind::Method, "P.IShape.Area()");
    assert_eq!(edge_count(&graph, &measure, &area, EdgeKind::Calls), Some(1));
    assert_eq!(
        edge_count(&graph, &measure, &node_id(NodeKind::Interface, "P.IShape"), EdgeKind::CallsVia),
        Some(1)
    );
    for implementation in ["P.Square.Area()", "P.Circle.Area()"] {
        assert_eq!(
            edge_count(&graph, &measure, &node_id(NodeKind::Method, implementation), EdgeKind::IndirectCall),
            Some(1),
            "{}",
            implementation
        );
    }
}

#[test]
fn test_platform_symbols_stay_out_of_the_graph() {
    let graph = analyze(&project(&[(
        "P/Logger.cs",
        r#"
using System;
using System.Collections.Generic;

namespace P
{
    public class Logger
    {
        private List<string> _lines = new List<string>();
        public void Write(string line)
        {
            Console.WriteLine(line);
            _lines.Add(line);
        }
    }
}
"#,
    )]));

    assert!(graph
        .nodes
        .iter()
        .all(|n| !n.fully_qualified_name.starts_with("System.")));
    let ids: BTreeSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &graph.edges {
        assert!(ids.contains(edge.source.as_str()), "dangling source {}", edge.source);
    }
}
