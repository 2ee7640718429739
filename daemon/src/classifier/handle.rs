use super::{Classifier, ClassifierError, ClassifierLoader};
use crate::config::ModelConfig;
use crate::frame::Frame;
use shared::{ClassifierStatus, PredictionSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type LoadTask = JoinHandle<Result<Box<dyn Classifier>, ClassifierError>>;

enum HandleState {
    Unloaded,
    Loading(LoadTask),
    Ready(Box<dyn Classifier>),
    Failed(String),
    Disposed,
}

/// Owns one classifier through `Unloaded → Loading → Ready → Disposed`.
///
/// Loading happens on a spawned task so several handles can load at once;
/// the owner calls [`refresh`](Self::refresh) once per tick to pick up the
/// result. A load error parks the handle in `Failed` for good.
pub struct ClassifierHandle {
    role: String,
    state: HandleState,
}

impl ClassifierHandle {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            state: HandleState::Unloaded,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Spawns the load. Ignored unless the handle is `Unloaded`.
    pub fn start_loading(&mut self, loader: Arc<dyn ClassifierLoader>, model: ModelConfig) {
        if !matches!(self.state, HandleState::Unloaded) {
            warn!("{} classifier: load requested in state {}", self.role, self.status());
            return;
        }

        info!("{} classifier: loading from {}", self.role, model.base_location);
        let task = tokio::spawn(async move { loader.load(&model).await });
        self.state = HandleState::Loading(task);
    }

    /// Moves a finished load into `Ready` or `Failed`. Never blocks on an
    /// unfinished load.
    pub async fn refresh(&mut self) {
        let finished = matches!(&self.state, HandleState::Loading(task) if task.is_finished());
        if !finished {
            return;
        }

        let HandleState::Loading(task) = std::mem::replace(&mut self.state, HandleState::Unloaded)
        else {
            return;
        };

        self.state = match task.await {
            Ok(Ok(classifier)) => {
                info!(
                    "{} classifier ready: {} ({} classes)",
                    self.role,
                    classifier.name(),
                    classifier.class_count()
                );
                HandleState::Ready(classifier)
            }
            Ok(Err(e)) => {
                error!("{} classifier failed to load: {}", self.role, e);
                HandleState::Failed(e.to_string())
            }
            Err(e) => {
                error!("{} classifier load task aborted: {}", self.role, e);
                HandleState::Failed(e.to_string())
            }
        };
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    pub fn status(&self) -> ClassifierStatus {
        match &self.state {
            HandleState::Unloaded => ClassifierStatus::Unloaded,
            HandleState::Loading(_) => ClassifierStatus::Loading,
            HandleState::Ready(classifier) => ClassifierStatus::Ready {
                class_count: classifier.class_count(),
            },
            HandleState::Failed(reason) => ClassifierStatus::Failed(reason.clone()),
            HandleState::Disposed => ClassifierStatus::Disposed,
        }
    }

    /// Runs one prediction. Refuses without touching the classifier unless
    /// the handle is `Ready`.
    pub async fn predict(&self, frame: &Frame) -> Result<PredictionSet, ClassifierError> {
        let HandleState::Ready(classifier) = &self.state else {
            return Err(ClassifierError::NotReady(self.role.clone()));
        };

        let predictions = classifier.predict(frame).await?;
        let expected = classifier.class_count();
        if predictions.len() != expected {
            return Err(ClassifierError::ClassCountMismatch {
                expected,
                actual: predictions.len(),
            });
        }

        debug!("{} classifier: {} predictions", self.role, predictions.len());
        Ok(predictions)
    }

    /// Releases whatever the handle holds. A loaded classifier is disposed
    /// exactly once; a load still in flight is aborted.
    pub fn dispose(&mut self) {
        match std::mem::replace(&mut self.state, HandleState::Disposed) {
            HandleState::Ready(mut classifier) => {
                classifier.dispose();
                info!("{} classifier disposed", self.role);
            }
            HandleState::Loading(task) => {
                task.abort();
                info!("{} classifier load aborted", self.role);
            }
            HandleState::Unloaded | HandleState::Failed(_) | HandleState::Disposed => {}
        }
    }
}

impl Drop for ClassifierHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::RgbImage;
    use shared::ClassPrediction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingClassifier {
        labels: Vec<String>,
        report_len: usize,
        predictions: Arc<AtomicUsize>,
        disposals: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Classifier for CountingClassifier {
        fn name(&self) -> &str {
            "counting"
        }

        fn class_count(&self) -> usize {
            self.labels.len()
        }

        async fn predict(&self, _frame: &Frame) -> Result<PredictionSet, ClassifierError> {
            self.predictions.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.report_len)
                .map(|i| ClassPrediction::new(format!("class-{}", i), 0.5))
                .collect())
        }

        fn dispose(&mut self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestLoader {
        fail: bool,
        report_len: usize,
        delay: Duration,
        predictions: Arc<AtomicUsize>,
        disposals: Arc<AtomicUsize>,
    }

    impl TestLoader {
        fn new() -> Self {
            Self {
                fail: false,
                report_len: 2,
                delay: Duration::ZERO,
                predictions: Arc::new(AtomicUsize::new(0)),
                disposals: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ClassifierLoader for TestLoader {
        async fn load(&self, _model: &ModelConfig) -> Result<Box<dyn Classifier>, ClassifierError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ClassifierError::Load("model.onnx missing".to_string()));
            }
            Ok(Box::new(CountingClassifier {
                labels: vec!["a".to_string(), "b".to_string()],
                report_len: self.report_len,
                predictions: Arc::clone(&self.predictions),
                disposals: Arc::clone(&self.disposals),
            }))
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(2, 2))
    }

    async fn load_until_settled(handle: &mut ClassifierHandle) {
        for _ in 0..100 {
            handle.refresh().await;
            if !matches!(handle.status(), ClassifierStatus::Loading) {
                return;
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("classifier never settled");
    }

    #[tokio::test]
    async fn test_predict_on_unloaded_handle_is_refused() {
        let handle = ClassifierHandle::new("image");
        assert_eq!(handle.status(), ClassifierStatus::Unloaded);
        let result = handle.predict(&frame()).await;
        assert!(matches!(result, Err(ClassifierError::NotReady(role)) if role == "image"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_predict_while_loading_is_refused() {
        let mut loader = TestLoader::new();
        loader.delay = Duration::from_secs(60);
        let predictions = Arc::clone(&loader.predictions);

        let mut handle = ClassifierHandle::new("pose");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/pose"));
        handle.refresh().await;

        assert_eq!(handle.status(), ClassifierStatus::Loading);
        assert!(handle.predict(&frame()).await.is_err());
        assert_eq!(predictions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_then_predict() {
        let loader = TestLoader::new();
        let predictions = Arc::clone(&loader.predictions);

        let mut handle = ClassifierHandle::new("image");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/image"));
        load_until_settled(&mut handle).await;

        assert_eq!(handle.status(), ClassifierStatus::Ready { class_count: 2 });
        let result = handle.predict(&frame()).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(predictions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_stays_failed() {
        let mut loader = TestLoader::new();
        loader.fail = true;

        let mut handle = ClassifierHandle::new("image");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/image"));
        load_until_settled(&mut handle).await;

        assert!(matches!(handle.status(), ClassifierStatus::Failed(reason) if reason.contains("model.onnx")));
        handle.refresh().await;
        assert!(!handle.is_ready());
        assert!(handle.predict(&frame()).await.is_err());
    }

    #[tokio::test]
    async fn test_class_count_change_is_rejected() {
        let mut loader = TestLoader::new();
        loader.report_len = 3;

        let mut handle = ClassifierHandle::new("image");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/image"));
        load_until_settled(&mut handle).await;

        let result = handle.predict(&frame()).await;
        assert!(matches!(
            result,
            Err(ClassifierError::ClassCountMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_dispose_exactly_once() {
        let loader = TestLoader::new();
        let disposals = Arc::clone(&loader.disposals);

        let mut handle = ClassifierHandle::new("image");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/image"));
        load_until_settled(&mut handle).await;

        handle.dispose();
        handle.dispose();
        drop(handle);

        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_disposes_ready_classifier() {
        let loader = TestLoader::new();
        let disposals = Arc::clone(&loader.disposals);

        let mut handle = ClassifierHandle::new("image");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/image"));
        load_until_settled(&mut handle).await;
        drop(handle);

        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_predict_after_dispose_is_refused() {
        let loader = TestLoader::new();
        let predictions = Arc::clone(&loader.predictions);

        let mut handle = ClassifierHandle::new("image");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/image"));
        load_until_settled(&mut handle).await;
        handle.dispose();

        assert_eq!(handle.status(), ClassifierStatus::Disposed);
        assert!(handle.predict(&frame()).await.is_err());
        assert_eq!(predictions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_while_loading_aborts() {
        let mut loader = TestLoader::new();
        loader.delay = Duration::from_secs(60);
        let disposals = Arc::clone(&loader.disposals);

        let mut handle = ClassifierHandle::new("pose");
        handle.start_loading(Arc::new(loader), ModelConfig::at("/models/pose"));
        handle.dispose();

        assert_eq!(handle.status(), ClassifierStatus::Disposed);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(disposals.load(Ordering::SeqCst), 0);
    }
}
