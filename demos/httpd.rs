//! Serves the sample controllers on 127.0.0.1:8889.
//!
//! ```text
//! cargo run --example httpd
//! curl -i http://127.0.0.1:8889/news/today
//! curl -i -X POST http://127.0.0.1:8889/post/request
//! ```

use snake_http::{json, Controller, Method, Methods, Request, Response, Server, ServerConfig};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn empty_list(_req: Request) -> futures::future::Ready<snake_http::HttpResponse> {
    futures::future::ready(Ok(Response::json(Vec::<u8>::new())))
}

fn success(method: &'static str) -> impl Fn(Request) -> futures::future::Ready<snake_http::HttpResponse> + Send + Sync + 'static {
    snake_http::handler::sync(move |_req| {
        Ok(Response::json(json!({
            "code": 200,
            "method": method,
            "message": "success"
        })))
    })
}

fn index() -> Controller {
    let mut index = Controller::new("");
    index.add_route("/*", Methods::ANY, empty_list);
    index
}

fn news() -> Controller {
    let mut news = Controller::new("/news");
    news.add_route("/c", Methods::ANY, empty_list)
        .add_route("/b", Method::GET, empty_list)
        .add_route("/{query}", Method::GET, |req: Request| async move {
            let query = req.param("query").unwrap_or_default().to_string();
            Ok(Response::json(json!({ "query": query })))
        });
    news
}

fn getting() -> Controller {
    let mut get = Controller::new("/get");
    get.add_route("/", Methods::ANY, success("GET"))
        .add_route("/a", Methods::ANY, empty_list)
        .add_route("/b", Method::GET, empty_list);
    get
}

fn user() -> Controller {
    let mut user = Controller::new("/user");
    user.add_route("/", Methods::ANY, empty_list)
        .add_route("/get", Method::GET, empty_list)
        .add_route("/get/value/*", Method::GET, |req: Request| async move {
            let rest = req.params.wildcard().unwrap_or_default().to_string();
            Ok(Response::json(json!({ "value": rest })))
        });
    user
}

fn post() -> Controller {
    let mut post = Controller::new("/post");
    post.add_route("/request", Methods::ANY, success("POST"));
    post
}

fn addings() -> Controller {
    let mut addings = Controller::new("/addings");
    addings
        .add_route("/*", Methods::ANY, empty_list)
        .add_route("/get", Method::GET, empty_list)
        .add_route("/get/value/*", Method::GET, empty_list);
    addings
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snake_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::default().address("127.0.0.1:8889".parse::<SocketAddr>()?);
    let mut server = Server::new(config);
    server
        .register(addings())?
        .register(news())?
        .register(getting())?
        .register(user())?
        .register(post())?
        .register(index())?;

    server.listen()?;
    Ok(())
}
