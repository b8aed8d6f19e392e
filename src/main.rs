#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() {
    use axum::Router;
    use diesel::r2d2::{ConnectionManager, Pool};
    use diesel::SqliteConnection;
    use leptos::logging::log;
    use leptos::prelude::*;
    use leptos_axum::{generate_route_list, LeptosRoutes};
    use pickem_pool::app::*;
    use pickem_pool::settings::current_clock;
    use pickem_pool::{api, database_url, run_migrations, SqlitePragmas};
    use std::env;

    let database_url = database_url().expect("DATABASE_URL must be set in .env.");
    let _ = env::var("ADMIN_PASSWORD").expect("ADMIN_PASSWORD must be set in .env.");

    let manager = ConnectionManager::<SqliteConnection>::new(&database_url);
    let pool: DbPool = Pool::builder()
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)
        .expect("Failed to create pool.");

    {
        let mut conn = pool.get().expect("Failed to get a connection.");
        run_migrations(&mut conn).expect("Failed to apply migrations.");
        match current_clock(&mut conn) {
            Ok(clock) => log!("Pool is on week {} of {}", clock.week, clock.season),
            Err(e) => leptos::logging::warn!("Could not read the season clock: {}", e),
        }
    }

    let conf = get_configuration(None).expect("Failed to read Leptos configuration.");
    let addr = conf.leptos_options.site_addr;
    let leptos_options = conf.leptos_options;
    // Generate the list of routes in your Leptos App
    let routes = generate_route_list(App);

    let leptos_options_clone = leptos_options.clone();
    let context_pool = pool.clone();
    let app = Router::new()
        .leptos_routes_with_context(
            &leptos_options,
            routes,
            // Provide pool for server functions.
            move || provide_context(context_pool.clone()),
            // Use App for main routes.
            move || shell(leptos_options_clone.clone()),
        )
        .merge(api::router(pool))
        // Use shell for fallback.
        .fallback(leptos_axum::file_and_error_handler(shell))
        .with_state(leptos_options.clone());

    log!("listening on http://{}", &addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener.");
    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server error.");
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // no client-side main function
    // see lib.rs for hydration function instead
}
