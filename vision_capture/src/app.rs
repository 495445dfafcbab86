use crate::{
    camera::{Camera, CameraError, FramePoller},
    config::Config,
    display::{BoardSink, LabelBoard, LogSink, SinkTarget, UiContext},
    gate::FrameGate,
    income::IncomeService,
    pipeline::{FrameObserver, Pipeline},
    publisher::ResultPublisher,
    selection::EngineSelection,
    serializer::DispatchSerializer,
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::{signal, sync::broadcast};
use vision_classifier::{
    ClassificationEngine, EngineError, OrtClassificationEngine, OrtIncomePredictor, TabularError,
    TabularPredictor,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load classification models: {0}")]
    Engine(#[from] EngineError),
    #[error("Failed to load income model: {0}")]
    Income(#[from] TabularError),
    #[error("Failed to initialize camera: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub async fn start_app(config: Config) -> Result<(), AppError> {
    let engine: Arc<dyn ClassificationEngine> =
        match OrtClassificationEngine::new(&config.models) {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                tracing::error!("Failed to load classification models: {:?}", e);
                return Err(e.into());
            }
        };
    tracing::info!(models = ?engine.models(), "Classification engine ready");

    let metrics = Arc::new(Metrics::new()?);
    let selection = EngineSelection::from_configs(&config.models);
    let board = LabelBoard::default();

    let mut ui = UiContext::new();
    let clear_after = config.display.clear_after();
    let mut sinks = HashMap::new();
    for model in &config.models {
        let target = SinkTarget::Model(model.id.clone());
        ui.register(
            target.clone(),
            Box::new(LogSink::new(model.id.to_string())),
            clear_after,
        );
        let handle = ui.register(
            target.clone(),
            Box::new(BoardSink::new(board.clone(), target)),
            clear_after,
        );
        sinks.insert(model.id.clone(), handle);
    }
    ui.register(SinkTarget::Status, Box::new(LogSink::new("status")), None);
    let status = ui.register(
        SinkTarget::Status,
        Box::new(BoardSink::new(board.clone(), SinkTarget::Status)),
        None,
    );

    let income = match &config.income {
        Some(income_config) => {
            let predictor: Arc<dyn TabularPredictor> =
                match OrtIncomePredictor::new(income_config) {
                    Ok(predictor) => Arc::new(predictor),
                    Err(e) => {
                        tracing::error!("Failed to load income model: {:?}", e);
                        return Err(e.into());
                    }
                };
            ui.register(SinkTarget::Income, Box::new(LogSink::new("income")), None);
            let label = ui.register(
                SinkTarget::Income,
                Box::new(BoardSink::new(board.clone(), SinkTarget::Income)),
                None,
            );
            Some(Arc::new(IncomeService::new(predictor, label)))
        }
        None => None,
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let ui_handle = tokio::spawn(ui.run(shutdown_tx.subscribe()));

    if let Some(income) = &income {
        if let Err(e) = income.refresh().await {
            tracing::warn!("Initial income prediction failed: {}", e);
        }
    }

    let publisher = ResultPublisher::new(config.pipeline.confidence_threshold);
    let (serializer, worker_handle) =
        DispatchSerializer::spawn(engine, publisher, sinks, metrics.clone());
    let gate = FrameGate::new(selection.clone(), serializer, metrics.clone());
    let pipeline = Arc::new(Pipeline::new(gate, status));

    let camera = match Camera::new(&config.camera).await {
        Ok(camera) => Arc::new(camera),
        Err(e) => {
            tracing::error!("Failed to initialize camera: {:?}", e);
            return Err(e.into());
        }
    };

    let state = SharedState {
        selection,
        board,
        pipeline: pipeline.clone(),
        metrics,
        income,
    };
    let server = HttpServer::new(state, &config.server).await?;
    let server_handle = server.run(shutdown_tx.subscribe())?;

    let observer: Arc<dyn FrameObserver> = pipeline;
    let poller_handle =
        FramePoller::new(camera, observer, &config.camera).run(shutdown_tx.subscribe());

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = poller_handle.await;
    match server_handle.await {
        Ok(Err(e)) => tracing::error!("Server failed: {:?}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    // the poller and the server held the last gate, so the worker drains
    // its queue and exits
    let _ = worker_handle.await;
    let _ = ui_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
