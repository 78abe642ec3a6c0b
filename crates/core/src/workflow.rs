//! Typed ComfyUI workflow graph.
//!
//! A [`WorkflowGraph`] maps node IDs to [`Node`]s. Each node has a closed
//! [`NodeRole`] and a set of named inputs that are either scalar literals
//! or references to another node's output slot. The service's
//! stringly-typed `class_type` tags only appear at the JSON boundary
//! ([`WorkflowGraph::to_prompt_json`]).
//!
//! The wire format is the ComfyUI "API prompt" shape:
//!
//! ```json
//! {
//!   "6": {
//!     "class_type": "CLIPTextEncode",
//!     "inputs": { "text": "a shrimp", "clip": ["38", 0] }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Node IDs are the string keys of the workflow JSON object.
pub type NodeId = String;

// ---------------------------------------------------------------------------
// Node roles
// ---------------------------------------------------------------------------

/// ComfyUI class type of the UNet loader.
const UNET_LOADER_CLASS: &str = "UNETLoader";
/// ComfyUI class type of the text-encoder (CLIP) loader.
const CLIP_LOADER_CLASS: &str = "CLIPLoader";
/// ComfyUI class type of the model-only LoRA loader.
const LORA_LOADER_CLASS: &str = "LoraLoaderModelOnly";
/// ComfyUI class type used for both prompt conditionings.
const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
/// ComfyUI class type of the empty latent canvas.
const EMPTY_LATENT_CLASS: &str = "EmptyLatentImage";
/// ComfyUI class type of the sampler.
const KSAMPLER_CLASS: &str = "KSampler";
/// ComfyUI class type of the VAE loader.
const VAE_LOADER_CLASS: &str = "VAELoader";
/// ComfyUI class type of the VAE decoder.
const VAE_DECODE_CLASS: &str = "VAEDecode";
/// ComfyUI class type of the image sink.
const SAVE_IMAGE_CLASS: &str = "SaveImage";

/// The fixed set of roles a node can play in the generation topology.
///
/// Internal code branches on roles, never on raw class-type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRole {
    UnetLoader,
    TextEncoderLoader,
    LoraLoader,
    PositiveConditioning,
    NegativeConditioning,
    LatentCanvas,
    Sampler,
    VaeLoader,
    Decoder,
    Sink,
}

impl NodeRole {
    /// Every role, in pipeline order.
    pub const ALL: [NodeRole; 10] = [
        NodeRole::UnetLoader,
        NodeRole::TextEncoderLoader,
        NodeRole::LoraLoader,
        NodeRole::PositiveConditioning,
        NodeRole::NegativeConditioning,
        NodeRole::LatentCanvas,
        NodeRole::Sampler,
        NodeRole::VaeLoader,
        NodeRole::Decoder,
        NodeRole::Sink,
    ];

    /// The ComfyUI `class_type` tag this role serializes to.
    pub fn class_type(self) -> &'static str {
        match self {
            NodeRole::UnetLoader => UNET_LOADER_CLASS,
            NodeRole::TextEncoderLoader => CLIP_LOADER_CLASS,
            NodeRole::LoraLoader => LORA_LOADER_CLASS,
            NodeRole::PositiveConditioning | NodeRole::NegativeConditioning => {
                CLIP_TEXT_ENCODE_CLASS
            }
            NodeRole::LatentCanvas => EMPTY_LATENT_CLASS,
            NodeRole::Sampler => KSAMPLER_CLASS,
            NodeRole::VaeLoader => VAE_LOADER_CLASS,
            NodeRole::Decoder => VAE_DECODE_CLASS,
            NodeRole::Sink => SAVE_IMAGE_CLASS,
        }
    }

}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A scalar input value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Literal {
    fn to_json(&self) -> Value {
        match self {
            Literal::Int(n) => Value::from(*n),
            Literal::Float(f) => Value::from(*f),
            Literal::Text(s) => Value::from(s.as_str()),
            Literal::Bool(b) => Value::from(*b),
        }
    }
}

/// A node input: either a literal or a reference to another node's output.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Literal(Literal),
    /// Data dependency on output `slot` of node `node_id`.
    OutputRef { node_id: NodeId, slot: u32 },
}

impl InputValue {
    pub fn int(n: i64) -> Self {
        InputValue::Literal(Literal::Int(n))
    }

    pub fn float(f: f64) -> Self {
        InputValue::Literal(Literal::Float(f))
    }

    pub fn text(s: impl Into<String>) -> Self {
        InputValue::Literal(Literal::Text(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        InputValue::Literal(Literal::Bool(b))
    }

    pub fn output(node_id: impl Into<NodeId>, slot: u32) -> Self {
        InputValue::OutputRef {
            node_id: node_id.into(),
            slot,
        }
    }

    /// Encode as ComfyUI JSON. References become `[node_id, slot]`.
    fn to_json(&self) -> Value {
        match self {
            InputValue::Literal(lit) => lit.to_json(),
            InputValue::OutputRef { node_id, slot } => {
                Value::Array(vec![Value::from(node_id.as_str()), Value::from(*slot)])
            }
        }
    }

}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A single operation in the workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub role: NodeRole,
    /// Named inputs, ordered by name for deterministic serialization.
    pub inputs: BTreeMap<String, InputValue>,
}

impl Node {
    pub fn new(role: NodeRole) -> Self {
        Self {
            role,
            inputs: BTreeMap::new(),
        }
    }

    /// Builder-style input setter.
    pub fn with_input(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.inputs.get(name)
    }

    /// Iterate `(input_name, producer_node_id, slot)` for every reference input.
    pub fn references(&self) -> impl Iterator<Item = (&str, &NodeId, u32)> {
        self.inputs.iter().filter_map(|(name, value)| match value {
            InputValue::OutputRef { node_id, slot } => Some((name.as_str(), node_id, *slot)),
            InputValue::Literal(_) => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A DAG of nodes submitted to ComfyUI as one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    nodes: BTreeMap<NodeId, Node>,
    /// Node whose output is the artifact of interest.
    sink: NodeId,
}

impl WorkflowGraph {
    /// Create an empty graph whose artifact will come from `sink`.
    pub fn new(sink: impl Into<NodeId>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            sink: sink.into(),
        }
    }

    /// Insert a node, returning any node previously stored under `id`.
    pub fn insert(&mut self, id: impl Into<NodeId>, node: Node) -> Option<Node> {
        self.nodes.insert(id.into(), node)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Check the structural invariants:
    ///
    /// - the sink node exists,
    /// - every output reference names a node in this graph,
    /// - there is no reference cycle (direct or transitive).
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.nodes.contains_key(&self.sink) {
            return Err(CoreError::InvalidGraph(format!(
                "Sink node '{}' is not part of the graph",
                self.sink
            )));
        }
        self.topological_order().map(|_| ())
    }

    /// Order node IDs so every producer precedes its consumers.
    ///
    /// Uses Kahn's algorithm with a sorted ready set, so the order is
    /// deterministic. Fails on dangling references and on cycles.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CoreError> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut consumers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (id, node) in &self.nodes {
            for (input_name, producer, _slot) in node.references() {
                if !self.nodes.contains_key(producer) {
                    return Err(CoreError::InvalidGraph(format!(
                        "Node '{id}' input '{input_name}' references missing node '{producer}'"
                    )));
                }
                if producer == id {
                    return Err(CoreError::InvalidGraph(format!(
                        "Node '{id}' input '{input_name}' references itself"
                    )));
                }
                *in_degree.entry(id.as_str()).or_default() += 1;
                consumers
                    .entry(producer.as_str())
                    .or_default()
                    .push(id.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for &consumer in consumers.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(consumer) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(consumer);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(id, _)| *id)
                .collect();
            return Err(CoreError::InvalidGraph(format!(
                "Reference cycle among nodes: {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }

    /// Serialize to the ComfyUI prompt JSON object.
    pub fn to_prompt_json(&self) -> Value {
        let mut obj = Map::new();
        for (id, node) in &self.nodes {
            let inputs: Map<String, Value> = node
                .inputs
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            let mut entry = Map::new();
            entry.insert("class_type".into(), Value::from(node.role.class_type()));
            entry.insert("inputs".into(), Value::Object(inputs));
            obj.insert(id.clone(), Value::Object(entry));
        }
        Value::Object(obj)
    }

    /// SHA-256 of the compact prompt JSON.
    ///
    /// Object keys serialize in sorted order, so identical graphs always
    /// hash the same. Useful for spotting duplicate submissions in logs.
    pub fn content_hash(&self) -> String {
        let canonical = self.to_prompt_json().to_string();
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}
