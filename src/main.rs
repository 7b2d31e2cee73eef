use std::{process, sync::Arc};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use stampa::{
    application::{
        convert::{Converter, PageConfig},
        document::{CoverImage, DocumentSource},
        engine::RenderEngine,
        error::AppError,
    },
    config,
    infra::{
        engine::ChromiumEngine,
        error::InfraError,
        http::{self, HttpState, ServiceInfo},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const SERVICE_NAME: &str = "HTML to PDF Converter";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

fn build_converter(settings: &config::Settings) -> Converter {
    let engine: Arc<dyn RenderEngine> = Arc::new(ChromiumEngine::new(settings.launch_profile()));
    Converter::new(
        engine,
        settings.render.wait_policy,
        settings.render.timings,
    )
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = HttpState {
        converter: Arc::new(build_converter(&settings)),
        service: Arc::new(ServiceInfo {
            name: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: settings.server.platform.clone(),
        }),
        page: PageConfig::default(),
    };

    let body_limit = settings.server.body_limit_bytes.get() as usize;
    let router = http::build_router(state, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "stampa::serve",
        addr = %settings.server.addr,
        mode = %settings.engine.mode,
        wait_policy = %settings.render.wait_policy,
        "Listening for conversion requests"
    );

    let graceful_shutdown = settings.server.graceful_shutdown;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: std::time::Duration) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(
        target = "stampa::serve",
        grace_secs = grace.as_secs(),
        "Shutdown requested; draining in-flight conversions"
    );
    // Exit hard if draining overruns the grace period.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        error!(target = "stampa::serve", "Graceful shutdown timed out");
        process::exit(1);
    });
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let input = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let source = if args.markdown {
        let cover = match args.cover.as_ref() {
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|err| AppError::from(InfraError::from(err)))?;
                let cover = CoverImage::from_base64(&STANDARD.encode(bytes))
                    .map_err(|err| AppError::validation(err.to_string()))?;
                Some(cover)
            }
            None => None,
        };
        DocumentSource::markdown(input, cover)
    } else {
        DocumentSource::html(input)
    };

    let converter = build_converter(&settings);
    let pdf = converter
        .convert(&source, &PageConfig::default())
        .await?;

    tokio::fs::write(&args.output, &pdf)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "stampa::render",
        input = %args.input.display(),
        output = %args.output.display(),
        pdf_bytes = pdf.len(),
        "PDF written"
    );

    Ok(())
}
