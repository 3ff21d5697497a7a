use celestial_tap::query::{CatalogueQuery, EsoArchive};
use celestial_tap::{Cone, SkyPosition, TapClient, TapConfig};

fn main() -> anyhow::Result<()> {
    let collection = std::env::args().nth(1).unwrap_or_else(|| "KiDS".to_string());

    let config = TapConfig::default();
    let archive = EsoArchive::new(TapClient::new(config.clone())?, config);

    let center = SkyPosition::parse("03:32:28.0", "-27:48:30")?;
    let cone = Cone::new(center, 60.0)?;
    println!("Cone search of {} around {} (r={}\")\n", collection, center, cone.radius_arcsec);

    let query = CatalogueQuery {
        cone: Some(cone),
        top: Some(20),
        ..CatalogueQuery::for_collections([collection])
    };

    for result in archive.query_catalogues(&query)? {
        println!("{}", result);
        println!("{}\n", result.table);
    }

    Ok(())
}
