#[cfg(feature = "ssr")]
use pickem_pool::{establish_connection, reset_database};

#[cfg(feature = "ssr")]
fn main() {
    let mut conn = establish_connection().expect("Failed to connect to the database");
    reset_database(&mut conn).expect("Failed to reset database");
    println!("Picks, weekly scores, sessions and game results have been cleared.");
}

#[cfg(not(feature = "ssr"))]
fn main() {
    println!("This binary requires the 'ssr' feature to be enabled.");
}
