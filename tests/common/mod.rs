#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ragchat::embedding::Embedder;
use ragchat::generation::{GenerationInvoker, ModelProcess, ProcessOutput};
use ragchat::retrieval::RetrievalEngine;
use ragchat::storage::{QueryMatch, VectorIndex};
use ragchat::{ChatPipeline, ConversationMemory, Error, GenerationConfig, Result};

pub const DIMENSIONS: usize = 4;

/// Deterministic embedder that remembers every text it was asked to embed
#[derive(Default)]
pub struct RecordingEmbedder {
    pub texts: Mutex<Vec<String>>,
}

impl RecordingEmbedder {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.texts.lock().unwrap().push(text.to_string());
        let mut vector = vec![0.0; DIMENSIONS];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % DIMENSIONS] += byte as f32 / 255.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Index returning the same hits for every query
pub struct FixedIndex {
    hits: Vec<QueryMatch>,
    fail: bool,
    pub queries: Mutex<u32>,
}

impl FixedIndex {
    pub fn with_texts(texts: &[&str]) -> Self {
        let hits = texts
            .iter()
            .enumerate()
            .map(|(i, text)| QueryMatch {
                id: i.to_string(),
                text: Some(text.to_string()),
                distance: i as f32 * 0.1,
            })
            .collect();
        Self {
            hits,
            fail: false,
            queries: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            fail: true,
            queries: Mutex::new(0),
        }
    }

    pub fn queries(&self) -> u32 {
        *self.queries.lock().unwrap()
    }
}

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn query(&self, _vector: &[f32], k: usize) -> Result<Vec<QueryMatch>> {
        *self.queries.lock().unwrap() += 1;
        if self.fail {
            return Err(Error::vector_db("collection unavailable"));
        }
        Ok(self.hits.iter().take(k).cloned().collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

pub enum Step {
    Exit { status: i32, stdout: &'static str, delay: Duration },
    Hang,
    LaunchError,
}

impl Step {
    pub fn ok(stdout: &'static str) -> Self {
        Step::Exit {
            status: 0,
            stdout,
            delay: Duration::ZERO,
        }
    }

    pub fn fail(stdout: &'static str) -> Self {
        Step::Exit {
            status: 1,
            stdout,
            delay: Duration::ZERO,
        }
    }

    pub fn slow_ok(stdout: &'static str, delay: Duration) -> Self {
        Step::Exit {
            status: 0,
            stdout,
            delay,
        }
    }
}

/// Model process that plays back scripted steps and records prompts
pub struct ScriptedProcess {
    steps: Mutex<VecDeque<Step>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedProcess {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProcess for ScriptedProcess {
    async fn run(&self, prompt: &str) -> Result<ProcessOutput> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let step = self.steps.lock().unwrap().pop_front().expect("unscripted model call");
        match step {
            Step::Exit {
                status,
                stdout,
                delay,
            } => {
                tokio::time::sleep(delay).await;
                Ok(ProcessOutput {
                    status: Some(status),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                })
            }
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProcessOutput {
                    status: Some(0),
                    stdout: "too late".to_string(),
                    stderr: String::new(),
                })
            }
            Step::LaunchError => Err(Error::generation_launch("failed to launch 'ollama'")),
        }
    }
}

pub struct Harness {
    pub pipeline: ChatPipeline,
    pub embedder: Arc<RecordingEmbedder>,
    pub index: Arc<FixedIndex>,
    pub process: Arc<ScriptedProcess>,
}

pub fn harness(index: FixedIndex, steps: Vec<Step>) -> Harness {
    let embedder = Arc::new(RecordingEmbedder::default());
    let index = Arc::new(index);
    let process = ScriptedProcess::new(steps);

    let retrieval = RetrievalEngine::new(embedder.clone(), index.clone(), 3).unwrap();
    let generator = GenerationInvoker::new(process.clone(), &GenerationConfig::default());
    let pipeline = ChatPipeline::new(Arc::new(ConversationMemory::new()), retrieval, generator);

    Harness {
        pipeline,
        embedder,
        index,
        process,
    }
}
