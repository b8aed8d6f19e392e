#[cfg(feature = "ssr")]
use pickem_pool::{establish_connection, scoring::recompute_week, settings::current_clock};

#[cfg(feature = "ssr")]
fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(week) = args.first().and_then(|w| w.parse::<i32>().ok()) else {
        eprintln!("Usage: recalculate_week <week> [season]");
        std::process::exit(2);
    };

    let mut conn = establish_connection().expect("Failed to connect to the database");
    let season = match args.get(1) {
        Some(season) => season.parse::<i32>().unwrap_or_else(|_| {
            eprintln!("Season must be a year, got {}", season);
            std::process::exit(2);
        }),
        None => {
            current_clock(&mut conn)
                .expect("Failed to read the season clock")
                .season
        }
    };

    let summary = recompute_week(&mut conn, week, season).expect("Failed to recalculate week");
    println!(
        "Week {} of {} recalculated for {} users.",
        summary.week, summary.season, summary.users_updated
    );
    for entry in &summary.leaderboard {
        println!(
            "{:>3}  {:<24} {:>3}/{:<3} {:>4} pts",
            entry.weekly_rank.map(|r| r.to_string()).unwrap_or_default(),
            entry.display_name,
            entry.correct_picks,
            entry.total_picks,
            entry.total_points
        );
    }
}

#[cfg(not(feature = "ssr"))]
fn main() {
    println!("This binary requires the 'ssr' feature to be enabled.");
}
