pub mod google_maps;
