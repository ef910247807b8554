use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use hamlet_engine::{gateway, images, Action, Engine, ImageId, Snapshot, Storage, World};
use hamlet_protocol::{Frame, Notice, PlaceRequest, Placed, Point, RawField, StateSummary};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub mod animator;
pub mod config;


pub use config::Config;

const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

pub struct AppState {
    pub engine: Engine,
    pub world: Mutex<World>,
    pub frames: watch::Sender<Frame>,
    pub surface: (f64, f64),
}

impl AppState {
    pub fn new(engine: Engine, surface: (f64, f64)) -> Self {
        let (frames, _) = watch::channel(Frame::blank(surface.0, surface.1));
        Self {
            engine,
            world: Mutex::new(World::new()),
            frames,
            surface,
        }
    }

    /// Lock the world. Never hold the guard across an `.await`.
    pub fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type ApiError = (StatusCode, Json<Notice>);
type ApiResult<T> = Result<T, ApiError>;

fn bad_request(err: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(Notice::warning(err.to_string())))
}

fn internal(err: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Notice::warning(err.to_string())),
    )
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/place", post(api_place))
        .route("/api/roads/begin", post(api_roads_begin))
        .route("/api/roads/point", post(api_roads_point))
        .route("/api/roads/finish", post(api_roads_finish))
        .route("/api/roads/cancel", post(api_roads_cancel))
        .route(
            "/api/residents",
            post(api_residents_create).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/api/residents/{index}/home", post(api_residents_home))
        .route("/api/residents/{index}/action", post(api_residents_action))
        .route("/api/save", post(api_save))
        .route("/api/load", post(api_load))
        .route("/api/frame", get(api_frame))
        .route("/api/state", get(api_state))
        .route("/api/snapshot", get(api_snapshot))
        .route("/api/images/{id}", get(api_image))
        .with_state(state)
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // Never use `Access-Control-Allow-Origin: *`; any website could drive the
        // local world through the browser otherwise.
        .layer(local_only_cors())
}

async fn health() -> &'static str {
    "ok"
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn api_place(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlaceRequest>,
) -> Json<Placed> {
    let mut world = state.world();
    let index = world.place(&req);
    Json(Placed {
        index,
        objects: world.objects().len(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct BeginRoad {
    #[serde(default)]
    highway: bool,
}

async fn api_roads_begin(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BeginRoad>,
) -> StatusCode {
    state.world().begin_road(input.highway);
    StatusCode::NO_CONTENT
}

async fn api_roads_point(
    State(state): State<Arc<AppState>>,
    Json(at): Json<Point>,
) -> ApiResult<StatusCode> {
    if state.world().add_road_point(at) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::CONFLICT,
            Json(Notice::warning("start a road before adding points")),
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FinishedRoad {
    pub index: Option<usize>,
}

async fn api_roads_finish(State(state): State<Arc<AppState>>) -> Json<FinishedRoad> {
    Json(FinishedRoad {
        index: state.world().finish_road(),
    })
}

async fn api_roads_cancel(State(state): State<Arc<AppState>>) -> StatusCode {
    state.world().cancel_road();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct ResidentParams {
    #[serde(default)]
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResidentAccepted {
    pub image: String,
}

/// Accept a resident whose bitmap is the request body. The resident shows up
/// once the decode finishes; the response does not wait for it.
async fn api_residents_create(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResidentParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ResidentAccepted>)> {
    let name = params.name.map(RawField::Text);
    let image = (!body.is_empty()).then(|| body.to_vec());
    let (request, arrivals) = {
        let world = state.world();
        let request = world
            .request_resident(Point::new(params.x, params.y), name.as_ref(), image)
            .map_err(bad_request)?;
        (request, world.arrivals())
    };

    let id = request.image_id().to_string();
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = engine.put_image(request.image_id(), request.bytes()) {
            tracing::warn!(error = %format!("{e:#}"), "could not store resident image");
        }
        let _ = arrivals.send(request.decode());
    });

    Ok((StatusCode::ACCEPTED, Json(ResidentAccepted { image: id })))
}

#[derive(Debug, Deserialize)]
struct HomeInput {
    house: usize,
}

async fn api_residents_home(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(input): Json<HomeInput>,
) -> ApiResult<StatusCode> {
    state
        .world()
        .send_home(index, input.house)
        .map_err(bad_request)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ActionInput {
    action: Action,
}

async fn api_residents_action(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(input): Json<ActionInput>,
) -> ApiResult<StatusCode> {
    state
        .world()
        .set_action(index, input.action)
        .map_err(bad_request)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_save(State(state): State<Arc<AppState>>) -> ApiResult<Json<Notice>> {
    let mut world = state.world();
    gateway::save(&mut world, &state.engine)
        .map(Json)
        .map_err(internal)
}

async fn api_load(State(state): State<Arc<AppState>>) -> ApiResult<Json<Option<Notice>>> {
    let notice = load_world(&state).map_err(internal)?;
    Ok(Json(notice))
}

/// Load the saved world and start re-decoding the bitmaps it references.
pub fn load_world(state: &Arc<AppState>) -> Result<Option<Notice>, hamlet_engine::GatewayError> {
    let (notice, pending, arrivals) = {
        let mut world = state.world();
        let notice = gateway::load(&mut world, &state.engine)?;
        (notice, world.unresolved_images(), world.arrivals())
    };
    if !pending.is_empty() {
        let engine = state.engine.clone();
        tokio::task::spawn_blocking(move || {
            for id in pending {
                let bytes = match engine.get_image(&id) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(image = %id, error = %format!("{e:#}"), "image lookup failed");
                        None
                    }
                };
                let _ = arrivals.send(images::resolve(id, bytes.as_deref()));
            }
        });
    }
    Ok(notice)
}

async fn api_frame(State(state): State<Arc<AppState>>) -> Json<Frame> {
    Json(state.frames.borrow().clone())
}

async fn api_state(State(state): State<Arc<AppState>>) -> ApiResult<Json<StateSummary>> {
    let rev = state.engine.get_rev().map_err(internal)?;
    let world = state.world();
    Ok(Json(StateSummary {
        objects: world.objects().len(),
        residents: world.residents().len(),
        drafting_road: world.road_draft().is_some(),
        rev,
    }))
}

async fn api_snapshot(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.world().snapshot())
}

async fn api_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .engine
        .get_image(&ImageId::from(id.as_str()))
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(Notice::warning(format!("no image {id}"))),
            )
        })?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    ))
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    serve_listener(listener, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    config: Config,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let engine = Engine::new(config.db_path());
    let state = Arc::new(AppState::new(engine, config.surface()));
    // A saved world that cannot be parsed stops startup rather than being overwritten.
    load_world(&state).context("load saved world")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let animator = animator::spawn_animator(state.clone(), config.fps, stop_rx);

    let app = build_router(state);
    let addr = listener.local_addr()?;
    tracing::info!(%addr, db = %config.db_path().display(), "server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    let _ = stop_tx.send(true);
    let frames = animator.await.context("join animator")?;
    tracing::info!(frames, "server stopped");
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    tracing::warn!(%ip, "rejected non-local peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}

const DASHBOARD_HTML: &str = r###"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Hamlet</title>
  <style>
    :root{
      --bg:#0b1424;
      --panel:#10213acc;
      --edge:#73c7ff55;
      --ice:#e6fbff;
      --muted:#8aa3be;
    }
    *{box-sizing:border-box;margin:0;padding:0}
    body{font-family:Inter,system-ui,sans-serif;color:var(--ice);background:var(--bg);padding:12px}
    .layout{display:grid;grid-template-columns:280px 1fr;gap:12px}
    .dock{border:1px solid var(--edge);border-radius:14px;background:var(--panel);padding:10px}
    .dock h2{font-size:13px;letter-spacing:.6px;margin:8px 0}
    .row{display:flex;gap:6px;flex-wrap:wrap;margin-bottom:8px}
    label{font-size:11px;color:var(--muted);display:flex;flex-direction:column;gap:2px}
    input{width:80px;background:#061325;color:var(--ice);border:1px solid #4f799f;border-radius:6px;padding:4px}
    input[type=file]{width:100%}
    .btn{border:1px solid #4f799f;background:#0b1b30;color:var(--ice);border-radius:8px;padding:6px 8px;cursor:pointer}
    .btn:hover{border-color:#8de7ff}
    .btn.on{border-color:#ffd06b}
    canvas{background:#fff;border-radius:10px;display:block}
    .status{font-size:11px;color:var(--muted);margin-top:8px}
  </style>
</head>
<body>
  <div class="layout">
    <aside class="dock">
      <h2>Build</h2>
      <div class="row">
        <label>width<input id="width" /></label>
        <label>height<input id="height" /></label>
        <label>radius<input id="radius" /></label>
        <label>length<input id="length" /></label>
        <label>speed<input id="speed" /></label>
        <label>company<input id="companyName" /></label>
      </div>
      <div class="row">
        <button class="btn" data-kind="foundation">Foundation</button>
        <button class="btn" data-kind="wheel">Wheel</button>
        <button class="btn" data-kind="house">House</button>
        <button class="btn" data-kind="company">Company</button>
        <button class="btn" data-kind="road">Road</button>
        <button class="btn" data-kind="highway">Highway</button>
        <button class="btn" data-kind="car">Car</button>
      </div>
      <h2>Draw road</h2>
      <div class="row">
        <button class="btn" id="drawRoad">Road path</button>
        <button class="btn" id="drawHighway">Highway path</button>
        <button class="btn" id="finishRoad">Finish</button>
        <button class="btn" id="cancelRoad">Cancel</button>
      </div>
      <h2>Residents</h2>
      <div class="row">
        <label>name<input id="residentName" /></label>
        <label style="width:100%">image<input id="residentImage" type="file" accept="image/*" /></label>
        <button class="btn" id="addResident">Add resident</button>
      </div>
      <h2>World</h2>
      <div class="row">
        <button class="btn" id="save">Save</button>
        <button class="btn" id="load">Load</button>
      </div>
      <div class="status" id="status">-</div>
    </aside>
    <main>
      <canvas id="gameCanvas" width="800" height="600"></canvas>
    </main>
  </div>

  <script>
  (function(){
    const $ = (id) => document.getElementById(id);
    const canvas = $("gameCanvas");
    const ctx = canvas.getContext("2d");
    const mouse = { x: 0, y: 0 };
    const images = new Map();
    let drafting = false;

    canvas.addEventListener("mousemove", (e) => {
      const r = canvas.getBoundingClientRect();
      mouse.x = e.clientX - r.left;
      mouse.y = e.clientY - r.top;
    });

    canvas.addEventListener("click", () => {
      if (!drafting) return;
      post("/api/roads/point", { x: mouse.x, y: mouse.y });
    });

    async function post(url, body){
      const r = await fetch(url, {
        method: "POST",
        headers: { "content-type": "application/json" },
        body: body === undefined ? "{}" : JSON.stringify(body),
      });
      const text = await r.text();
      const j = text ? JSON.parse(text) : null;
      if (!r.ok && j && j.message) alert(j.message);
      return j;
    }

    function field(id){
      const v = $(id).value;
      return v === "" ? undefined : v;
    }

    for (const b of document.querySelectorAll("[data-kind]")){
      b.addEventListener("click", () => post("/api/place", {
        kind: b.dataset.kind, x: mouse.x, y: mouse.y,
        width: field("width"), height: field("height"), radius: field("radius"),
        length: field("length"), speed: field("speed"), name: field("companyName"),
      }));
    }

    function setDrafting(on){
      drafting = on;
      $("drawRoad").classList.toggle("on", on);
      $("drawHighway").classList.toggle("on", on);
    }
    $("drawRoad").addEventListener("click", async () => { await post("/api/roads/begin", { highway: false }); setDrafting(true); });
    $("drawHighway").addEventListener("click", async () => { await post("/api/roads/begin", { highway: true }); setDrafting(true); });
    $("finishRoad").addEventListener("click", async () => { await post("/api/roads/finish"); setDrafting(false); });
    $("cancelRoad").addEventListener("click", async () => { await post("/api/roads/cancel"); setDrafting(false); });

    $("addResident").addEventListener("click", async () => {
      const file = $("residentImage").files[0];
      if (!file){ alert("Select an image for the resident"); return; }
      const q = new URLSearchParams({ x: mouse.x, y: mouse.y });
      const name = field("residentName");
      if (name) q.set("name", name);
      const r = await fetch(`/api/residents?${q}`, { method: "POST", body: file });
      if (!r.ok){ const j = await r.json(); alert(j.message); }
    });

    $("save").addEventListener("click", async () => {
      const n = await post("/api/save");
      if (n && n.message) alert(n.message);
    });
    $("load").addEventListener("click", async () => {
      const n = await post("/api/load");
      if (n && n.message) alert(n.message);
    });

    function image(id){
      let img = images.get(id);
      if (!img){
        img = new Image();
        img.src = `/api/images/${encodeURIComponent(id)}`;
        images.set(id, img);
      }
      return img;
    }

    function replay(frame){
      if (canvas.width !== frame.width) canvas.width = frame.width;
      if (canvas.height !== frame.height) canvas.height = frame.height;
      for (const c of frame.commands){
        switch (c.op){
          case "clear":
            ctx.clearRect(0, 0, c.width, c.height);
            break;
          case "fill_rect":
            ctx.fillStyle = c.color;
            ctx.fillRect(c.x, c.y, c.width, c.height);
            break;
          case "fill_circle":
            ctx.fillStyle = c.color;
            ctx.beginPath();
            ctx.arc(c.x, c.y, c.radius, 0, Math.PI * 2);
            ctx.fill();
            break;
          case "fill_text":
            ctx.fillStyle = c.color;
            ctx.font = c.font;
            ctx.fillText(c.text, c.x, c.y);
            break;
          case "stroke_path":
            ctx.strokeStyle = c.color;
            ctx.lineWidth = c.line_width;
            ctx.beginPath();
            c.points.forEach((p, i) => i === 0 ? ctx.moveTo(p.x, p.y) : ctx.lineTo(p.x, p.y));
            ctx.stroke();
            break;
          case "draw_image": {
            const img = image(c.image);
            if (img.complete && img.naturalWidth > 0) ctx.drawImage(img, c.x, c.y, c.width, c.height);
            break;
          }
        }
      }
    }

    async function loop(){
      try{
        const r = await fetch("/api/frame", { cache: "no-store" });
        const frame = await r.json();
        replay(frame);
        $("status").textContent = `frame ${frame.seq} · pointer ${mouse.x.toFixed(0)},${mouse.y.toFixed(0)}`;
      }catch(_e){
        $("status").textContent = "offline";
      }
      requestAnimationFrame(loop);
    }
    requestAnimationFrame(loop);
  })();
  </script>
</body>
</html>
"###;
