use super::device::{build_session, SessionOptions};
use super::{ExamModel, ImageEncoder, ModelOutput, RiskTransformer};
use crate::batch::Batch;
use crate::error::{MiraiError, Result};
use ndarray::{Array2, ArrayD, ArrayView2, ArrayView3, ArrayView4, Ix2, IxDyn};
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const IMG_X: &str = "img_x";
const X: &str = "x";
const VIEW_SEQ: &str = "view_seq";
const SIDE_SEQ: &str = "side_seq";
const TIME_SEQ: &str = "time_seq";
const RISK_FACTORS: &str = "risk_factors";
const HIDDEN: &str = "hidden";

/// Borrowed input tensor of either element type the graphs take
#[derive(Debug)]
pub enum TensorInput<'a> {
    F32(&'a [f32], Vec<usize>),
    I64(&'a [i64], Vec<usize>),
}

impl<'a> TensorInput<'a> {
    pub fn f32<D: ndarray::Dimension>(view: &ndarray::ArrayView<'a, f32, D>) -> Result<Self> {
        let data = view
            .to_slice()
            .ok_or_else(|| MiraiError::Inference("f32 tensor is not contiguous".into()))?;
        Ok(TensorInput::F32(data, view.shape().to_vec()))
    }

    pub fn i64(array: &'a Array2<i64>) -> Result<Self> {
        let data = array
            .as_slice()
            .ok_or_else(|| MiraiError::Inference("i64 tensor is not contiguous".into()))?;
        Ok(TensorInput::I64(data, array.shape().to_vec()))
    }

    fn to_value(&self) -> Result<SessionInputValue<'a>> {
        Ok(match self {
            TensorInput::F32(data, shape) => {
                TensorRef::from_array_view((dims(shape), *data))?.into()
            }
            TensorInput::I64(data, shape) => {
                TensorRef::from_array_view((dims(shape), *data))?.into()
            }
        })
    }
}

fn dims(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|&d| d as i64).collect()
}

/// One ONNX graph and its declared input/output names
pub struct OnnxGraph {
    path: PathBuf,
    session: Mutex<Session>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl OnnxGraph {
    pub fn load(path: &Path, options: &SessionOptions) -> Result<Self> {
        let session = build_session(path, options).map_err(|e| {
            MiraiError::Configuration(format!("cannot load {}: {}", path.display(), e))
        })?;
        let inputs = session.inputs.iter().map(|i| i.name.clone()).collect();
        let outputs = session.outputs.iter().map(|o| o.name.clone()).collect();
        Ok(Self {
            path: path.to_path_buf(),
            session: Mutex::new(session),
            inputs,
            outputs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i == name)
    }

    pub fn first_input(&self) -> Result<&str> {
        self.inputs
            .first()
            .map(String::as_str)
            .ok_or_else(|| self.error("graph declares no inputs"))
    }

    /// Fails unless every name in `required` is a declared input
    pub fn require_inputs(&self, required: &[&str]) -> Result<()> {
        match required.iter().find(|name| !self.has_input(name)) {
            None => Ok(()),
            Some(missing) => Err(MiraiError::Configuration(format!(
                "{} has no input '{}' (declared: {})",
                self.path.display(),
                missing,
                self.inputs.join(", ")
            ))),
        }
    }

    /// Runs the graph, returning every f32 output in declaration order
    pub fn run(&self, inputs: &[(&str, TensorInput)]) -> Result<Vec<(String, ArrayD<f32>)>> {
        let values = inputs
            .iter()
            .map(|(name, input)| Ok((Cow::Borrowed(*name), input.to_value()?)))
            .collect::<Result<Vec<_>>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| self.error("session lock poisoned"))?;
        let ort_inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(values);
        let outputs = session.run(ort_inputs)?;

        let mut results = Vec::with_capacity(self.outputs.len());
        for name in &self.outputs {
            // Non-float outputs are diagnostic only
            let Ok((shape, data)) = outputs[name.as_str()].try_extract_tensor::<f32>() else {
                continue;
            };
            let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            let array = ArrayD::from_shape_vec(IxDyn(&shape), data.to_vec())?;
            results.push((name.clone(), array));
        }
        Ok(results)
    }

    fn error(&self, message: &str) -> MiraiError {
        MiraiError::Inference(format!("{}: {}", self.path.display(), message))
    }
}

/// Splits graph outputs into logits, hidden state and the rest
fn model_output(graph: &OnnxGraph, outputs: Vec<(String, ArrayD<f32>)>) -> Result<ModelOutput> {
    let mut outputs = outputs.into_iter();
    let (_, logits) = outputs
        .next()
        .ok_or_else(|| graph.error("graph produced no float outputs"))?;
    let logits = logits
        .into_dimensionality::<Ix2>()
        .map_err(|e| graph.error(&format!("logits are not 2D: {}", e)))?;

    let mut hidden = None;
    let mut activations = BTreeMap::new();
    for (name, array) in outputs {
        if name == HIDDEN {
            hidden = Some(array);
        } else {
            activations.insert(name, array);
        }
    }
    Ok(ModelOutput {
        logits,
        hidden,
        activations,
    })
}

/// Stage-1 graph: first input takes images, optional `risk_factors` input
pub struct OnnxImageEncoder {
    graph: OnnxGraph,
}

impl OnnxImageEncoder {
    pub fn load(path: &Path, options: &SessionOptions) -> Result<Self> {
        let graph = OnnxGraph::load(path, options)?;
        graph.first_input()?;
        Ok(Self { graph })
    }
}

impl ImageEncoder for OnnxImageEncoder {
    fn encode(
        &self,
        images: ArrayView4<f32>,
        risk_factors: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        let mut inputs = vec![(self.graph.first_input()?, TensorInput::f32(&images)?)];
        if let Some(rf) = risk_factors.as_ref() {
            if self.graph.has_input(RISK_FACTORS) {
                inputs.push((RISK_FACTORS, TensorInput::f32(rf)?));
            }
        }

        let (_, encoded) = self
            .graph
            .run(&inputs)?
            .into_iter()
            .next()
            .ok_or_else(|| self.graph.error("encoder produced no float outputs"))?;
        let rows = encoded.shape().first().copied().unwrap_or(0);
        let cols = if rows == 0 { 0 } else { encoded.len() / rows };
        // Trailing singleton spatial dims are flattened away
        Ok(encoded.into_shape_with_order((rows, cols))?)
    }
}

/// Stage-2 graph with `img_x`, `view_seq`, `side_seq`, `time_seq` inputs
pub struct OnnxRiskTransformer {
    graph: OnnxGraph,
}

impl OnnxRiskTransformer {
    pub fn load(path: &Path, options: &SessionOptions) -> Result<Self> {
        let graph = OnnxGraph::load(path, options)?;
        graph.require_inputs(&[IMG_X, VIEW_SEQ, SIDE_SEQ, TIME_SEQ])?;
        Ok(Self { graph })
    }
}

/// Sequence inputs shared by both graph layouts; risk factors are bound only
/// when `bind_risk_factors` is set
fn sequence_inputs<'a>(
    batch: &'a Batch,
    risk_factors: Option<&'a ArrayView2<'_, f32>>,
    bind_risk_factors: bool,
) -> Result<Vec<(&'static str, TensorInput<'a>)>> {
    let mut inputs = vec![
        (VIEW_SEQ, TensorInput::i64(&batch.view_seq)?),
        (SIDE_SEQ, TensorInput::i64(&batch.side_seq)?),
        (TIME_SEQ, TensorInput::i64(&batch.time_seq)?),
    ];
    if let Some(rf) = risk_factors.filter(|_| bind_risk_factors) {
        inputs.push((RISK_FACTORS, TensorInput::f32(rf)?));
    }
    Ok(inputs)
}

impl RiskTransformer for OnnxRiskTransformer {
    fn forward(
        &self,
        img_x: ArrayView3<f32>,
        risk_factors: Option<ArrayView2<f32>>,
        batch: &Batch,
    ) -> Result<ModelOutput> {
        let mut inputs = vec![(IMG_X, TensorInput::f32(&img_x)?)];
        inputs.extend(sequence_inputs(
            batch,
            risk_factors.as_ref(),
            self.graph.has_input(RISK_FACTORS),
        )?);
        let outputs = self.graph.run(&inputs)?;
        model_output(&self.graph, outputs)
    }
}

/// Single graph from the `(B, C, N, H, W)` batch to logits
pub struct OnnxExamModel {
    graph: OnnxGraph,
}

impl OnnxExamModel {
    pub fn load(path: &Path, options: &SessionOptions) -> Result<Self> {
        let graph = OnnxGraph::load(path, options)?;
        graph.require_inputs(&[X, VIEW_SEQ, SIDE_SEQ, TIME_SEQ])?;
        Ok(Self { graph })
    }
}

impl ExamModel for OnnxExamModel {
    fn forward(&self, batch: &Batch, risk_factors: Option<ArrayView2<f32>>) -> Result<ModelOutput> {
        let x = batch.x.view();
        let mut inputs = vec![(X, TensorInput::f32(&x)?)];
        inputs.extend(sequence_inputs(
            batch,
            risk_factors.as_ref(),
            self.graph.has_input(RISK_FACTORS),
        )?);
        let outputs = self.graph.run(&inputs)?;
        model_output(&self.graph, outputs)
    }
}
