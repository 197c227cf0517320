use lodestone_content::{
    AttachedReference, BinarySerializer, Codec, ContentError, ContentGraph, ContentObject,
    ContentSerializer, ContentValue, TextSerializer, MAX_DEPTH,
};
use pretty_assertions::assert_eq;

fn scene() -> ContentGraph {
    let mut graph = ContentGraph::new();
    let mesh = graph.add_object(
        ContentObject::new("Mesh")
            .with_field("vertices", ContentValue::Bytes(vec![1, 2, 3, 4]))
            .with_field("scale", ContentValue::Float(0.5)),
    );
    let camera = graph.add_object(
        ContentObject::new("Entity")
            .with_field("name", "camera")
            .with_field("active", true),
    );
    let root = graph.add_object(
        ContentObject::new("Scene")
            .with_field("mesh", mesh)
            .with_field(
                "children",
                ContentValue::List(vec![camera.into(), ContentValue::Null, 7i64.into()]),
            ),
    );
    graph.set_root(root);
    graph
}

/// A linked list of `Node` objects, `links` deep, built tail first.
fn chain(links: usize) -> ContentGraph {
    let mut graph = ContentGraph::new();
    let mut next = ContentValue::Null;
    for index in (0..links).rev() {
        let node = graph.add_object(
            ContentObject::new("Node")
                .with_field("index", index as i64)
                .with_field("next", next),
        );
        next = node.into();
    }
    graph.set_root(next);
    graph
}

#[test]
fn acyclic_graphs_round_trip_through_both_codecs() -> eyre::Result<()> {
    let graph = scene();
    for codec in [Codec::Binary, Codec::Text] {
        let serializer = codec.serializer();
        let decoded = serializer.decode_graph(&serializer.encode(&graph)?)?;
        assert_eq!(decoded, graph, "codec {}", serializer.name());
    }
    Ok(())
}

#[test]
fn binary_keeps_cycles_and_text_breaks_them() -> eyre::Result<()> {
    let mut graph = ContentGraph::new();
    let parent = graph.add_object(ContentObject::new("Entity").with_field("name", "parent"));
    let child = graph.add_object(
        ContentObject::new("Entity")
            .with_field("name", "child")
            .with_field("parent", parent),
    );
    graph.set_field(parent, "children", ContentValue::List(vec![child.into()]));
    graph.set_root(parent);

    let binary = BinarySerializer::default();
    let decoded = binary.decode_graph(&binary.encode(&graph)?)?;
    assert!(decoded.has_cycle());
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded, graph);

    let text = TextSerializer::default();
    let decoded = text.decode_graph(&text.encode(&graph)?)?;
    assert!(!decoded.has_cycle());
    let json = decoded.to_json()?;
    assert_eq!(json["children"][0]["parent"], serde_json::Value::Null);
    assert_eq!(json["children"][0]["name"], "child");
    Ok(())
}

#[test]
fn attached_references_survive_the_text_form() -> eyre::Result<()> {
    let mut graph = ContentGraph::new();
    let texture = graph.add_object(
        ContentObject::new("Texture").attached_to(AttachedReference::new("a1", "gfx/sky")),
    );
    graph.set_root(texture);

    let text = TextSerializer::default();
    let decoded = text.decode_graph(&text.encode(&graph)?)?;
    assert_eq!(decoded, graph);
    Ok(())
}

#[test]
fn deep_acyclic_chains_round_trip_through_both_codecs() -> eyre::Result<()> {
    let graph = chain(200);
    for codec in [Codec::Binary, Codec::Text] {
        let serializer = codec.serializer();
        let decoded = serializer.decode_graph(&serializer.encode(&graph)?)?;
        assert_eq!(decoded.len(), 200, "codec {}", serializer.name());
        assert!(decoded == graph, "codec {}", serializer.name());
    }
    Ok(())
}

#[test]
fn both_codecs_share_the_nesting_limit() -> eyre::Result<()> {
    // Recursion at the limit needs more than the default test thread stack in debug builds.
    let worker = std::thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(|| -> eyre::Result<()> {
            // The last node's fields sit one level below the node itself.
            let deepest = chain(MAX_DEPTH);
            let too_deep = chain(MAX_DEPTH + 1);
            for codec in [Codec::Binary, Codec::Text] {
                let serializer = codec.serializer();
                let bytes = serializer.encode(&deepest)?;
                assert_eq!(serializer.decode_graph(&bytes)?.len(), MAX_DEPTH);
                assert!(
                    matches!(serializer.encode(&too_deep), Err(ContentError::TooDeep(MAX_DEPTH))),
                    "codec {}",
                    serializer.name()
                );
            }
            Ok(())
        })?;
    worker
        .join()
        .map_err(|_| eyre::eyre!("nesting limit worker panicked"))?
}
