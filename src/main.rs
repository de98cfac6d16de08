fn main() {
    tournament_categories_lib::run()
}
